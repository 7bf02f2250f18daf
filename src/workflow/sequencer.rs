//! Runs workflows step by step against an `Invoker` and a `ResultCache`.
//!
//! Each run owns a fresh `ContextAccumulator`; the cache is the only state
//! shared between runs.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::run::{RunStatus, StepAttempt, WorkflowRun};
use super::{Step, Workflow};
use crate::cache::{DEFAULT_TTL_SECS, ResultCache};
use crate::context::{ContextAccumulator, DEFAULT_CONTEXT_BUDGET, EstimatorKind, Priority};
use crate::errors::{InvokeError, WorkflowError};
use crate::invoke::{FailureKind, Invocation, InvocationRequest, Invoker};
use crate::template::Parameters;

#[derive(Debug, Clone)]
pub struct SequencerSettings {
    pub cache_ttl: Duration,
    pub context_budget: usize,
    pub estimator: EstimatorKind,
    pub use_cache: bool,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            context_budget: DEFAULT_CONTEXT_BUDGET,
            estimator: EstimatorKind::Chars,
            use_cache: true,
        }
    }
}

enum StepOutcome {
    Succeeded,
    Failed {
        kind: FailureKind,
        diagnostic: String,
    },
    Aborted(InvokeError),
}

pub struct Sequencer {
    invoker: Arc<dyn Invoker>,
    cache: Arc<dyn ResultCache>,
    settings: SequencerSettings,
}

impl Sequencer {
    pub fn new(
        invoker: Arc<dyn Invoker>,
        cache: Arc<dyn ResultCache>,
        settings: SequencerSettings,
    ) -> Self {
        Self {
            invoker,
            cache,
            settings,
        }
    }

    fn accumulator(&self) -> ContextAccumulator {
        ContextAccumulator::with_estimator(self.settings.context_budget, self.settings.estimator.build())
    }

    /// Run every step of `workflow` from the top.
    ///
    /// Parameters are checked against every step first; a missing one is an
    /// error and nothing is spawned.
    pub async fn run(
        &self,
        workflow: &Workflow,
        params: &Parameters,
    ) -> Result<WorkflowRun, WorkflowError> {
        workflow.check_parameters(params)?;
        let run = WorkflowRun::start(workflow.name(), params.clone());
        info!(run = %run.short_id(), workflow = workflow.name(), "Starting workflow run");
        Ok(self.execute(workflow, run, self.accumulator(), 0).await)
    }

    /// Continue `previous` from the step it stopped at.
    ///
    /// Earlier steps are replayed from `previous` without spawning. The
    /// restarted step skips the cache lookup; later steps use it normally.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        params: &Parameters,
        previous: &WorkflowRun,
    ) -> Result<WorkflowRun, WorkflowError> {
        let not_resumable = |reason: String| WorkflowError::NotResumable {
            run_id: previous.id.to_string(),
            reason,
        };

        if previous.workflow != workflow.name() {
            return Err(not_resumable(format!(
                "it belongs to workflow '{}', not '{}'",
                previous.workflow,
                workflow.name()
            )));
        }
        let restart = previous
            .resume_point()
            .ok_or_else(|| not_resumable(format!("its status is {}", previous.status)))?;
        if restart == 0 || restart > workflow.steps().len() {
            return Err(not_resumable(format!(
                "step {} does not exist in workflow '{}'",
                restart,
                workflow.name()
            )));
        }
        workflow.check_parameters(params)?;

        let mut run = WorkflowRun::start(workflow.name(), params.clone());
        run.resumed_from = Some(previous.id);
        let mut context = self.accumulator();

        for (index, step) in workflow.steps()[..restart - 1].iter().enumerate() {
            let number = index + 1;
            let prior = previous
                .last_attempt(number)
                .filter(|a| a.name == step.name())
                .ok_or_else(|| not_resumable(format!("no record of step {} ({})", number, step.name())))?;

            let mut replayed = prior.clone();
            replayed.replayed = true;
            match replayed.invocation.status.failure_kind() {
                None => absorb_output(&mut context, step, replayed.invocation.output()),
                Some(kind) => absorb_failure(
                    &mut context,
                    step,
                    number,
                    kind,
                    replayed.invocation.diagnostic(),
                ),
            }
            run.record(replayed);
        }

        info!(
            run = %run.short_id(),
            resumed_from = %previous.short_id(),
            step = restart,
            "Resuming workflow run"
        );
        Ok(self.execute(workflow, run, context, restart - 1).await)
    }

    /// Run several independent workflows concurrently. Each gets its own
    /// accumulator; they share only the cache. Results keep batch order.
    pub async fn run_many(
        &self,
        batch: &[(Workflow, Parameters)],
    ) -> Vec<Result<WorkflowRun, WorkflowError>> {
        join_all(batch.iter().map(|(workflow, params)| self.run(workflow, params))).await
    }

    /// Execute steps from index `start` and seal the run. The step at
    /// `start` bypasses the cache when the run is a resume.
    async fn execute(
        &self,
        workflow: &Workflow,
        mut run: WorkflowRun,
        mut context: ContextAccumulator,
        start: usize,
    ) -> WorkflowRun {
        let bypass = run.resumed_from.is_some().then_some(start);

        for (index, step) in workflow.steps().iter().enumerate().skip(start) {
            let number = index + 1;
            info!(
                run = %run.short_id(),
                step = number,
                name = step.name(),
                "Starting step"
            );

            let snapshot = context.render(self.settings.context_budget);
            let prompt = match step.template().render(&run.parameters, &snapshot) {
                Ok(prompt) => prompt,
                Err(e) => {
                    run.seal(RunStatus::Aborted {
                        step: number,
                        name: step.name().to_string(),
                        kind: "template".to_string(),
                        reason: e.to_string(),
                    });
                    return run;
                }
            };
            let mut request =
                InvocationRequest::new(prompt, step.capabilities().clone(), step.reasoning());
            if let Some(timeout) = step.timeout() {
                request = request.with_timeout(timeout);
            }

            match self
                .run_step(&mut run, number, step, &request, bypass == Some(index))
                .await
            {
                StepOutcome::Succeeded => {
                    let output = run
                        .last_attempt(number)
                        .map(|a| a.invocation.output().to_string())
                        .unwrap_or_default();
                    absorb_output(&mut context, step, &output);
                }
                StepOutcome::Failed { kind, diagnostic } if step.continues_on_failure() => {
                    warn!(
                        run = %run.short_id(),
                        step = number,
                        name = step.name(),
                        %kind,
                        "Step failed, continuing"
                    );
                    absorb_failure(&mut context, step, number, kind, &diagnostic);
                }
                StepOutcome::Failed { kind, diagnostic } => {
                    warn!(
                        run = %run.short_id(),
                        step = number,
                        name = step.name(),
                        %kind,
                        "Step failed, halting run"
                    );
                    run.seal(RunStatus::FailedAtStep {
                        step: number,
                        name: step.name().to_string(),
                        kind: kind.to_string(),
                        diagnostic,
                    });
                    return run;
                }
                StepOutcome::Aborted(e) => {
                    warn!(
                        run = %run.short_id(),
                        step = number,
                        name = step.name(),
                        error = %e,
                        "Step aborted"
                    );
                    run.seal(RunStatus::Aborted {
                        step: number,
                        name: step.name().to_string(),
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    });
                    return run;
                }
            }
        }

        run.seal(RunStatus::Succeeded);
        info!(run = %run.short_id(), spawned = run.spawn_count(), "Workflow run succeeded");
        run
    }

    async fn run_step(
        &self,
        run: &mut WorkflowRun,
        number: usize,
        step: &Step,
        request: &InvocationRequest,
        bypass_cache: bool,
    ) -> StepOutcome {
        let fingerprint = request.fingerprint();

        if self.settings.use_cache && !bypass_cache {
            if let Some(output) = self.cache.get(&fingerprint) {
                debug!(step = number, fingerprint = %fingerprint.short(), "Cache hit");
                run.record(StepAttempt {
                    step: number,
                    name: step.name().to_string(),
                    attempt: 1,
                    replayed: false,
                    invocation: Invocation::from_cache(request, fingerprint, output),
                });
                return StepOutcome::Succeeded;
            }
        } else if bypass_cache {
            debug!(step = number, "Skipping cache lookup for resumed step");
        }

        let mut attempt = 1;
        loop {
            let invocation = match self.invoker.invoke(request).await {
                Ok(invocation) => invocation,
                Err(e) => return StepOutcome::Aborted(e),
            };
            let failure = invocation.status.failure_kind();
            let diagnostic = invocation.diagnostic().to_string();

            if failure.is_none() && self.settings.use_cache {
                if let Err(e) = self
                    .cache
                    .put(&fingerprint, invocation.output(), self.settings.cache_ttl)
                {
                    warn!(error = %e, kind = e.kind(), "Failed to store result in cache");
                }
            }

            run.record(StepAttempt {
                step: number,
                name: step.name().to_string(),
                attempt,
                replayed: false,
                invocation,
            });

            match failure {
                None => return StepOutcome::Succeeded,
                Some(kind) if attempt >= step.max_attempts() => {
                    return StepOutcome::Failed { kind, diagnostic };
                }
                Some(kind) => {
                    warn!(
                        step = number,
                        attempt,
                        max_attempts = step.max_attempts(),
                        %kind,
                        "Attempt failed, retrying"
                    );
                    attempt += 1;
                }
            }
        }
    }
}

fn absorb_output(context: &mut ContextAccumulator, step: &Step, output: &str) {
    context.append(
        format!("## {}\n{}", step.name(), output.trim_end()),
        step.context_priority(),
    );
}

/// Failure markers go in at `High` so later steps see them over routine output.
fn absorb_failure(
    context: &mut ContextAccumulator,
    step: &Step,
    number: usize,
    kind: FailureKind,
    diagnostic: &str,
) {
    context.append(failure_marker(step.name(), number, kind, diagnostic), Priority::High);
}

pub fn failure_marker(name: &str, number: usize, kind: FailureKind, diagnostic: &str) -> String {
    let mut marker = format!("## {}\n[step {} failed: {}]", name, number, kind);
    let diagnostic = diagnostic.trim();
    if !diagnostic.is_empty() {
        marker.push(' ');
        marker.push_str(diagnostic);
    }
    marker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoCache};
    use crate::invoke::{CapabilitySet, InvocationStatus, ReasoningLevel};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Reply {
        Ok(&'static str),
        Exit(i32, &'static str),
        Timeout,
        SpawnError,
    }

    type Responder = Box<dyn Fn(&str, usize) -> Reply + Send + Sync>;

    /// Answers by prompt; `usize` counts earlier calls for prompts containing
    /// the same step marker.
    struct FakeInvoker {
        prompts: Mutex<Vec<String>>,
        respond: Responder,
    }

    impl FakeInvoker {
        fn new(respond: impl Fn(&str, usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn ok() -> Arc<Self> {
            Self::new(|prompt, _| {
                if prompt.contains("step-a") {
                    Reply::Ok("output of a")
                } else if prompt.contains("step-b") {
                    Reply::Ok("output of b")
                } else {
                    Reply::Ok("output of c")
                }
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        fn calls_for(&self, marker: &str) -> usize {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| marker_of(p) == Some(marker))
                .count()
        }
    }

    /// The step marker is the last `step-x` in the prompt; earlier ones come
    /// from context.
    fn marker_of(prompt: &str) -> Option<&'static str> {
        ["step-a", "step-b", "step-c"]
            .into_iter()
            .filter_map(|m| prompt.rfind(m).map(|pos| (pos, m)))
            .max()
            .map(|(_, m)| m)
    }

    #[async_trait]
    impl Invoker for FakeInvoker {
        async fn invoke(&self, request: &InvocationRequest) -> Result<Invocation, InvokeError> {
            let previous = marker_of(&request.prompt)
                .map(|m| self.calls_for(m))
                .unwrap_or(0);
            self.prompts.lock().unwrap().push(request.prompt.clone());

            let (status, stdout, stderr) = match (self.respond)(&request.prompt, previous) {
                Reply::Ok(out) => (InvocationStatus::Succeeded, out, ""),
                Reply::Exit(code, err) => (InvocationStatus::Failed { exit_code: code }, "", err),
                Reply::Timeout => (InvocationStatus::TimedOut { limit_secs: 1.0 }, "", ""),
                Reply::SpawnError => {
                    return Err(InvokeError::SpawnFailed {
                        command: "claude".to_string(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    });
                }
            };
            Ok(Invocation {
                prompt: request.prompt.clone(),
                capabilities: request.capabilities.clone(),
                reasoning: request.reasoning,
                fingerprint: request.fingerprint(),
                started_at: Utc::now(),
                ended_at: Utc::now(),
                status,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                cached: false,
            })
        }
    }

    fn three_steps(continue_b: bool) -> Workflow {
        Workflow::new(
            "three",
            vec![
                Step::new("a", "step-a: analyze $ARGUMENTS")
                    .unwrap()
                    .with_capabilities(CapabilitySet::parse(["Read"]).unwrap())
                    .with_reasoning(ReasoningLevel::Light),
                Step::new("b", "step-b: build").unwrap().continue_on_failure(continue_b),
                Step::new("c", "step-c: check").unwrap(),
            ],
        )
        .unwrap()
    }

    fn sequencer(invoker: Arc<FakeInvoker>, cache: Arc<dyn ResultCache>) -> Sequencer {
        Sequencer::new(invoker, cache, SequencerSettings::default())
    }

    fn fail_b(prompt: &str, _: usize) -> Reply {
        match marker_of(prompt) {
            Some("step-b") => Reply::Exit(2, "b exploded"),
            Some("step-a") => Reply::Ok("output of a"),
            _ => Reply::Ok("output of c"),
        }
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let invoker = FakeInvoker::ok();
        let seq = sequencer(invoker.clone(), Arc::new(MemoryCache::new()));
        let run = seq
            .run(&three_steps(false), &Parameters::new().with_arguments("X"))
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert!(run.ended_at.is_some());
        assert_eq!(invoker.calls(), 3);
        assert_eq!(
            run.output(),
            "## a\noutput of a\n\n## b\noutput of b\n\n## c\noutput of c"
        );
        assert_eq!(
            run.attempts.iter().map(|a| a.step).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_prior_output_threads_into_later_prompts() {
        let invoker = FakeInvoker::ok();
        let seq = sequencer(invoker.clone(), Arc::new(NoCache));
        seq.run(&three_steps(false), &Parameters::new().with_arguments("X"))
            .await
            .unwrap();

        let prompts = invoker.prompts();
        assert_eq!(prompts[0], "step-a: analyze X");
        assert!(prompts[1].starts_with("## PRIOR CONTEXT\n## a\noutput of a"));
        assert!(prompts[2].contains("## b\noutput of b"));
        assert!(prompts[2].ends_with("step-c: check"));
    }

    #[tokio::test]
    async fn test_failure_halts_at_step_two() {
        let invoker = FakeInvoker::new(fail_b);
        let seq = sequencer(invoker.clone(), Arc::new(MemoryCache::new()));
        let run = seq.run(&three_steps(false), &Parameters::new()).await.unwrap();

        assert_eq!(
            run.status,
            RunStatus::FailedAtStep {
                step: 2,
                name: "b".to_string(),
                kind: "invocation-nonzero-exit".to_string(),
                diagnostic: "b exploded".to_string(),
            }
        );
        assert_eq!(invoker.calls_for("step-c"), 0);
        assert_eq!(run.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_continue_on_failure_leaves_marker() {
        let invoker = FakeInvoker::new(fail_b);
        let seq = sequencer(invoker.clone(), Arc::new(MemoryCache::new()));
        let run = seq.run(&three_steps(true), &Parameters::new()).await.unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(invoker.calls_for("step-c"), 1);
        let last_prompt = invoker.prompts().pop().unwrap();
        assert!(last_prompt.contains(&failure_marker(
            "b",
            2,
            FailureKind::NonZeroExit,
            "b exploded"
        )));
        assert_eq!(
            run.step_outputs().iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let invoker = FakeInvoker::ok();
        let cache: Arc<dyn ResultCache> = Arc::new(MemoryCache::new());
        let seq = sequencer(invoker.clone(), cache);
        let workflow = Workflow::new(
            "single",
            vec![
                Step::new("a", "analyze X step-a")
                    .unwrap()
                    .with_capabilities(CapabilitySet::parse(["Read"]).unwrap())
                    .with_reasoning(ReasoningLevel::Light),
            ],
        )
        .unwrap();

        let first = seq.run(&workflow, &Parameters::new()).await.unwrap();
        assert_eq!(invoker.calls(), 1);
        let second = seq.run(&workflow, &Parameters::new()).await.unwrap();

        assert_eq!(invoker.calls(), 1);
        assert_eq!(second.spawn_count(), 0);
        assert!(second.attempts[0].invocation.cached);
        assert_eq!(second.output(), first.output());
        assert_eq!(
            second.attempts[0].invocation.fingerprint,
            first.attempts[0].invocation.fingerprint
        );
    }

    #[tokio::test]
    async fn test_cache_disabled_always_spawns() {
        let invoker = FakeInvoker::ok();
        let settings = SequencerSettings {
            use_cache: false,
            ..SequencerSettings::default()
        };
        let seq = Sequencer::new(invoker.clone(), Arc::new(MemoryCache::new()), settings);
        seq.run(&three_steps(false), &Parameters::new()).await.unwrap();
        seq.run(&three_steps(false), &Parameters::new()).await.unwrap();
        assert_eq!(invoker.calls(), 6);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let invoker = FakeInvoker::new(fail_b);
        let seq = sequencer(invoker.clone(), Arc::new(MemoryCache::new()));
        seq.run(&three_steps(false), &Parameters::new()).await.unwrap();
        seq.run(&three_steps(false), &Parameters::new()).await.unwrap();
        assert_eq!(invoker.calls_for("step-a"), 1);
        assert_eq!(invoker.calls_for("step-b"), 2);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let invoker = FakeInvoker::new(|_, previous| {
            if previous < 2 {
                Reply::Exit(1, "flaky")
            } else {
                Reply::Ok("finally")
            }
        });
        let seq = sequencer(invoker.clone(), Arc::new(NoCache));
        let workflow = Workflow::new(
            "retry",
            vec![Step::new("a", "step-a").unwrap().with_max_attempts(3)],
        )
        .unwrap();

        let run = seq.run(&workflow, &Parameters::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(
            run.attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(run.output(), "## a\nfinally");
    }

    #[tokio::test]
    async fn test_retries_exhausted_on_timeout() {
        let invoker = FakeInvoker::new(|_, _| Reply::Timeout);
        let seq = sequencer(invoker.clone(), Arc::new(NoCache));
        let workflow = Workflow::new(
            "slow",
            vec![Step::new("a", "step-a").unwrap().with_max_attempts(2)],
        )
        .unwrap();

        let run = seq.run(&workflow, &Parameters::new()).await.unwrap();
        assert_eq!(invoker.calls(), 2);
        assert!(matches!(
            run.status,
            RunStatus::FailedAtStep { step: 1, ref kind, .. } if kind == "invocation-timeout"
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_aborts_immediately() {
        let invoker = FakeInvoker::new(|_, _| Reply::SpawnError);
        let seq = sequencer(invoker.clone(), Arc::new(NoCache));
        let workflow = Workflow::new(
            "missing",
            vec![
                Step::new("a", "step-a").unwrap().with_max_attempts(3),
                Step::new("b", "step-b").unwrap(),
            ],
        )
        .unwrap();

        let run = seq.run(&workflow, &Parameters::new()).await.unwrap();
        assert_eq!(invoker.calls(), 1);
        assert!(run.attempts.is_empty());
        assert!(matches!(
            run.status,
            RunStatus::Aborted { step: 1, ref kind, .. } if kind == "invocation-spawn-failure"
        ));
    }

    #[tokio::test]
    async fn test_missing_parameter_spawns_nothing() {
        let invoker = FakeInvoker::ok();
        let seq = sequencer(invoker.clone(), Arc::new(NoCache));
        let workflow = Workflow::new(
            "params",
            vec![
                Step::new("a", "step-a").unwrap(),
                Step::new("b", "step-b for {{target}}").unwrap(),
            ],
        )
        .unwrap();

        let err = seq.run(&workflow, &Parameters::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Parameters { ref step, .. } if step == "b"));
        assert_eq!(invoker.calls(), 0);
    }

    #[tokio::test]
    async fn test_resume_replays_and_bypasses_cache_for_failed_step() {
        let invoker = FakeInvoker::new(|prompt, previous| match marker_of(prompt) {
            Some("step-b") if previous == 0 => Reply::Exit(1, "first try fails"),
            Some("step-b") => Reply::Ok("fresh b"),
            Some("step-a") => Reply::Ok("output of a"),
            _ => Reply::Ok("output of c"),
        });
        let cache: Arc<dyn ResultCache> = Arc::new(MemoryCache::new());
        let seq = sequencer(invoker.clone(), cache.clone());
        let workflow = three_steps(false);

        let failed = seq.run(&workflow, &Parameters::new()).await.unwrap();
        assert_eq!(failed.resume_point(), Some(2));

        // A stale entry for step 2's exact prompt must not be used.
        let b_fingerprint = failed.last_attempt(2).unwrap().invocation.fingerprint.clone();
        cache.put(&b_fingerprint, "stale b", Duration::from_secs(60)).unwrap();

        let resumed = seq
            .resume(&workflow, &Parameters::new(), &failed)
            .await
            .unwrap();

        assert_eq!(resumed.status, RunStatus::Succeeded);
        assert_eq!(resumed.resumed_from, Some(failed.id));
        assert_eq!(invoker.calls_for("step-a"), 1);
        assert_eq!(invoker.calls_for("step-b"), 2);
        assert!(resumed.attempts[0].replayed);
        assert_eq!(
            resumed.output(),
            "## a\noutput of a\n\n## b\nfresh b\n\n## c\noutput of c"
        );
        assert_eq!(cache.get(&b_fingerprint), Some("fresh b".to_string()));
    }

    #[tokio::test]
    async fn test_resume_replays_failure_marker_of_continued_step() {
        let invoker = FakeInvoker::new(|prompt, previous| match marker_of(prompt) {
            Some("step-a") => Reply::Exit(2, "a exploded"),
            Some("step-b") if previous == 0 => Reply::Exit(1, "b down"),
            Some("step-b") => Reply::Ok("b fixed"),
            _ => Reply::Ok("output of c"),
        });
        let seq = sequencer(invoker.clone(), Arc::new(MemoryCache::new()));
        let workflow = Workflow::new(
            "lenient",
            vec![
                Step::new("a", "step-a: analyze").unwrap().continue_on_failure(true),
                Step::new("b", "step-b: build").unwrap(),
                Step::new("c", "step-c: check").unwrap(),
            ],
        )
        .unwrap();

        let failed = seq.run(&workflow, &Parameters::new()).await.unwrap();
        assert_eq!(failed.resume_point(), Some(2));

        let resumed = seq
            .resume(&workflow, &Parameters::new(), &failed)
            .await
            .unwrap();

        assert_eq!(resumed.status, RunStatus::Succeeded);
        assert_eq!(invoker.calls_for("step-a"), 1);
        assert!(resumed.attempts[0].replayed);
        assert!(!resumed.attempts[0].invocation.succeeded());

        let marker = "## a\n[step 1 failed: invocation-nonzero-exit] a exploded";
        let b_prompts: Vec<String> = invoker
            .prompts()
            .into_iter()
            .filter(|p| marker_of(p) == Some("step-b"))
            .collect();
        assert_eq!(b_prompts.len(), 2);
        assert!(b_prompts.iter().all(|p| p.contains(marker)));
    }

    #[tokio::test]
    async fn test_resume_rejects_successful_run() {
        let invoker = FakeInvoker::ok();
        let seq = sequencer(invoker.clone(), Arc::new(NoCache));
        let workflow = three_steps(false);
        let done = seq.run(&workflow, &Parameters::new()).await.unwrap();

        let err = seq
            .resume(&workflow, &Parameters::new(), &done)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotResumable { .. }));
    }

    #[tokio::test]
    async fn test_resume_rejects_other_workflow() {
        let invoker = FakeInvoker::new(fail_b);
        let seq = sequencer(invoker.clone(), Arc::new(NoCache));
        let failed = seq.run(&three_steps(false), &Parameters::new()).await.unwrap();
        let other = Workflow::new("other", vec![Step::new("a", "step-a").unwrap()]).unwrap();

        assert!(seq.resume(&other, &Parameters::new(), &failed).await.is_err());
    }

    #[tokio::test]
    async fn test_run_many_keeps_batch_order() {
        let invoker = FakeInvoker::new(|prompt, _| {
            if prompt.contains("second") {
                Reply::Exit(1, "no")
            } else {
                Reply::Ok("yes")
            }
        });
        let seq = sequencer(invoker.clone(), Arc::new(MemoryCache::new()));
        let batch = vec![
            (
                Workflow::new("first", vec![Step::new("s", "first step-a").unwrap()]).unwrap(),
                Parameters::new(),
            ),
            (
                Workflow::new("second", vec![Step::new("s", "second step-b").unwrap()]).unwrap(),
                Parameters::new(),
            ),
        ];

        let runs = seq.run_many(&batch).await;
        assert_eq!(runs.len(), 2);
        let first = runs[0].as_ref().unwrap();
        let second = runs[1].as_ref().unwrap();
        assert_eq!(first.workflow, "first");
        assert!(first.status.is_success());
        assert_eq!(second.failed_step(), Some(1));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_failure_marker_format() {
        assert_eq!(
            failure_marker("b", 2, FailureKind::TimedOut, "  \n"),
            "## b\n[step 2 failed: invocation-timeout]"
        );
        assert_eq!(
            failure_marker("b", 2, FailureKind::NonZeroExit, "boom\n"),
            "## b\n[step 2 failed: invocation-nonzero-exit] boom"
        );
    }
}
