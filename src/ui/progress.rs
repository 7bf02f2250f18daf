use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::invoke::OutputSink;

/// Spinner shown while the external tool runs.
///
/// Streamed output lines are printed above the spinner so the two never
/// interleave. With `echo` off the lines are dropped and only the spinner
/// remains.
pub struct RunProgress {
    bar: ProgressBar,
    echo: bool,
}

impl RunProgress {
    pub fn new(message: impl Into<String>, echo: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar, echo }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl OutputSink for RunProgress {
    fn line(&self, line: &str) {
        if self.echo {
            self.bar
                .println(format!("  {} {}", style("│").dim(), style(line).dim()));
        }
    }
}

impl Drop for RunProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
