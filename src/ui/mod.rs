//! Terminal output for the `conductor` binary.
//!
//! Reports go to stderr; stdout carries only results so it can be piped.

pub mod icons;
pub mod progress;

pub use progress::RunProgress;

use console::style;

use crate::workflow::{RunStatus, StepAttempt, WorkflowRun};
use icons::{CACHED, CHECK, CLOCK, CROSS, REPLAYED, RETRY, SPARKLE, WARN};

/// One line describing a step attempt.
pub fn attempt_line(attempt: &StepAttempt) -> String {
    let inv = &attempt.invocation;
    let icon = if attempt.replayed {
        REPLAYED
    } else if inv.cached {
        CACHED
    } else if inv.succeeded() {
        CHECK
    } else if attempt.attempt > 1 {
        RETRY
    } else {
        CROSS
    };
    let mut line = format!(
        "{}{} {}",
        icon,
        style(format!("[{}]", attempt.step)).dim(),
        style(&attempt.name).bold()
    );
    if attempt.attempt > 1 {
        line.push_str(&format!(" (attempt {})", attempt.attempt));
    }
    if attempt.replayed {
        line.push_str(&style(" replayed").dim().to_string());
    } else if inv.cached {
        line.push_str(&style(" cached").dim().to_string());
    } else {
        let ms = inv.duration().num_milliseconds().max(0);
        line.push_str(&format!(
            " {}",
            style(format!("{:.1}s", ms as f64 / 1000.0)).dim()
        ));
        if !inv.succeeded() {
            line.push_str(&format!(" {}", style(&inv.status).red()));
        }
    }
    line
}

/// Per-step lines and a closing status line, on stderr.
pub fn print_run_report(run: &WorkflowRun) {
    eprintln!();
    eprintln!(
        "{}{} {}",
        SPARKLE,
        style(&run.workflow).bold(),
        style(format!("run {}", run.short_id())).dim()
    );
    for attempt in &run.attempts {
        eprintln!("  {}", attempt_line(attempt));
    }

    let elapsed = run
        .duration()
        .map(|d| format!("{:.1}s", d.num_milliseconds().max(0) as f64 / 1000.0))
        .unwrap_or_default();
    match &run.status {
        RunStatus::Succeeded => eprintln!(
            "{}{} {}{}",
            CHECK,
            style("Succeeded").green().bold(),
            CLOCK,
            elapsed
        ),
        RunStatus::FailedAtStep {
            step,
            name,
            kind,
            diagnostic,
        } => {
            eprintln!(
                "{}{} at step {} ({}): {}",
                CROSS,
                style("Failed").red().bold(),
                step,
                name,
                kind
            );
            if !diagnostic.is_empty() {
                for line in diagnostic.lines() {
                    eprintln!("  {} {}", style("│").red(), line);
                }
            }
            eprintln!(
                "  Resume with: conductor resume {} --run {}",
                run.workflow,
                run.short_id()
            );
        }
        RunStatus::Aborted {
            step,
            name,
            kind,
            reason,
        } => {
            eprintln!(
                "{}{} at step {} ({}): {}",
                WARN,
                style("Aborted").yellow().bold(),
                step,
                name,
                kind
            );
            eprintln!("  {}", reason);
        }
        RunStatus::Running => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{CapabilitySet, InvocationRequest, InvocationStatus, ReasoningLevel};

    fn attempt(cached: bool, status: InvocationStatus, n: u32) -> StepAttempt {
        let req = InvocationRequest::new("p", CapabilitySet::new(), ReasoningLevel::None);
        let mut invocation = crate::invoke::Invocation::from_cache(&req, req.fingerprint(), "o".into());
        invocation.cached = cached;
        invocation.status = status;
        StepAttempt {
            step: 2,
            name: "build".into(),
            attempt: n,
            replayed: false,
            invocation,
        }
    }

    #[test]
    fn test_attempt_line_marks_cache_and_failures() {
        console::set_colors_enabled(false);
        let cached = attempt_line(&attempt(true, InvocationStatus::Succeeded, 1));
        assert!(cached.contains("[2] build cached"));

        let failed = attempt_line(&attempt(false, InvocationStatus::Failed { exit_code: 3 }, 2));
        assert!(failed.contains("(attempt 2)"));
        assert!(failed.contains("failed (exit 3)"));
    }
}
