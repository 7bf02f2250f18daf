//! Process invocation of the external Claude CLI.
//!
//! - `Invoker` is the seam the sequencer calls through. `ProcessInvoker` is the
//!   real implementation; tests substitute scripted doubles.
//! - `OutputSink` receives stdout lines as they stream, for live observability.
//!   The CLI's spinner implements it; `NullSink` discards.

pub mod capability;
pub mod process;
pub mod reasoning;
pub mod types;

pub use capability::{Capability, CapabilitySet};
pub use process::{InvokerSettings, ProcessInvoker};
pub use reasoning::{ReasoningLevel, THINKING_TOKENS_ENV};
pub use types::{FailureKind, Invocation, InvocationRequest, InvocationStatus};

use async_trait::async_trait;

use crate::errors::InvokeError;

/// Runs one invocation of the external tool.
///
/// Implementations never retry and never swallow a failure: they return a
/// definitively marked `Invocation`, or an `InvokeError` when nothing could
/// be run at all.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> Result<Invocation, InvokeError>;
}

/// Pass-through destination for streamed stdout lines.
pub trait OutputSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Discards everything.
pub struct NullSink;

impl OutputSink for NullSink {
    fn line(&self, _line: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording(Mutex<Vec<String>>);

    impl OutputSink for Recording {
        fn line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn test_sinks_are_object_safe() {
        let sinks: Vec<Box<dyn OutputSink>> = vec![
            Box::new(NullSink),
            Box::new(Recording(Mutex::new(Vec::new()))),
        ];
        for sink in &sinks {
            sink.line("hello");
        }
    }
}
