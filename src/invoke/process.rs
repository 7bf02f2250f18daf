//! Subprocess-backed invoker for the Claude CLI.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    Invocation, InvocationRequest, InvocationStatus, Invoker, NullSink, OutputSink,
    THINKING_TOKENS_ENV,
};
use crate::errors::InvokeError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 900;

/// How long the output pipes may keep draining once the child has exited.
const PIPE_GRACE: Duration = Duration::from_millis(500);
const MIN_PIPE_GRACE: Duration = Duration::from_millis(50);

/// How to launch the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerSettings {
    pub command: String,
    /// Arguments placed before the prompt flag, for wrappers such as `npx`.
    pub prefix_args: Vec<String>,
    /// Arguments appended after the generated flags.
    pub extra_args: Vec<String>,
    pub skip_permissions: bool,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Wall-clock limit per invocation. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            prefix_args: Vec::new(),
            extra_args: Vec::new(),
            skip_permissions: false,
            working_dir: None,
            env: Vec::new(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

impl InvokerSettings {
    /// Arguments (without the command itself) for one request.
    pub fn args_for(&self, request: &InvocationRequest) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.push("-p".to_string());
        args.push(request.prompt.clone());
        if !request.capabilities.is_empty() {
            args.push("--allowedTools".to_string());
            args.extend(request.capabilities.names().into_iter().map(String::from));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Spawns one external process per call and streams its output.
pub struct ProcessInvoker {
    settings: InvokerSettings,
    sink: Arc<dyn OutputSink>,
}

impl ProcessInvoker {
    pub fn new(settings: InvokerSettings) -> Self {
        Self {
            settings,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }
}

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<Invocation, InvokeError> {
        if request.prompt.trim().is_empty() {
            return Err(InvokeError::EmptyPrompt);
        }

        let command = self.settings.command.clone();
        let args = self.settings.args_for(request);
        let limit = request.timeout.or(self.settings.timeout);
        let io_err = |source: std::io::Error| InvokeError::Io {
            command: command.clone(),
            source,
        };

        debug!(
            command = %command,
            capabilities = %request.capabilities,
            reasoning = %request.reasoning,
            prompt_chars = request.prompt.len(),
            "Spawning external tool"
        );

        let mut cmd = Command::new(&command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.settings.env {
            cmd.env(key, value);
        }
        if let Some(tokens) = request.reasoning.budget_hint() {
            cmd.env(THINKING_TOKENS_ENV, tokens.to_string());
        }

        let started_at = Utc::now();
        let deadline = limit.map(|limit| Instant::now() + limit);
        let mut child = cmd.spawn().map_err(|source| InvokeError::SpawnFailed {
            command: command.clone(),
            source,
        })?;
        debug!(pid = child.id().unwrap_or(0), "Process spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_err(std::io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_err(std::io::Error::other("stderr was not captured")))?;

        // Both pipes drain into shared buffers so whatever arrived survives
        // a reader that has to be abandoned.
        let captured = Arc::new(Mutex::new(String::new()));
        let sink = self.sink.clone();
        let stdout_buf = captured.clone();
        let mut stdout_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await? == 0 {
                    return Ok::<_, std::io::Error>(());
                }
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(|c: char| c == '\n' || c == '\r');
                sink.line(text);
                let mut buf = stdout_buf.lock().await;
                buf.push_str(text);
                buf.push('\n');
            }
        });

        let diagnostics = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = diagnostics.clone();
        let mut stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut chunk = [0u8; 8192];
            loop {
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    return Ok::<_, std::io::Error>(());
                }
                stderr_buf.lock().await.extend_from_slice(&chunk[..n]);
            }
        });

        let waited = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        let status = match waited {
            Some(Ok(exit)) => match exit.code().unwrap_or(-1) {
                0 => InvocationStatus::Succeeded,
                exit_code => InvocationStatus::Failed { exit_code },
            },
            Some(Err(source)) => {
                let _ = child.start_kill();
                stdout_task.abort();
                stderr_task.abort();
                return Err(io_err(source));
            }
            None => {
                let limit = limit.unwrap_or_default();
                warn!(
                    command = %command,
                    limit_secs = limit.as_secs_f64(),
                    "Invocation exceeded its time limit, killing process"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out process");
                }
                InvocationStatus::TimedOut {
                    limit_secs: limit.as_secs_f64(),
                }
            }
        };

        // The child is gone. Pipes still open now are held by processes it
        // left behind, so draining stays inside the deadline.
        let grace = match (&status, deadline) {
            (InvocationStatus::TimedOut { .. }, _) | (_, None) => PIPE_GRACE,
            (_, Some(deadline)) => deadline
                .saturating_duration_since(Instant::now())
                .clamp(MIN_PIPE_GRACE, PIPE_GRACE),
        };
        let drained = tokio::time::timeout(grace, async {
            let out = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
            out
        })
        .await;
        stdout_task.abort();
        stderr_task.abort();

        match drained {
            Ok(Ok(Err(source))) => return Err(io_err(source)),
            Ok(_) => {}
            Err(_) => warn!(
                command = %command,
                "Output pipes still open after exit, keeping what was read"
            ),
        }
        let captured = std::mem::take(&mut *captured.lock().await);
        let stderr = String::from_utf8_lossy(&diagnostics.lock().await).into_owned();

        let invocation = Invocation {
            prompt: request.prompt.clone(),
            capabilities: request.capabilities.clone(),
            reasoning: request.reasoning,
            fingerprint: request.fingerprint(),
            started_at,
            ended_at: Utc::now(),
            status,
            stdout: captured,
            stderr,
            cached: false,
        };

        debug!(
            status = %invocation.status,
            duration_ms = invocation.duration().num_milliseconds(),
            output_chars = invocation.stdout.len(),
            "Invocation finished"
        );

        Ok(invocation)
    }
}
