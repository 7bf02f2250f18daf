//! One-off invocation: `conductor invoke`.

use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::super::Cli;
use super::load_config;
use conductor::invoke::{
    CapabilitySet, Invocation, InvocationRequest, Invoker, ProcessInvoker, ReasoningLevel,
};
use conductor::ui::RunProgress;

pub async fn cmd_invoke(
    cli: &Cli,
    project_dir: &Path,
    prompt: &str,
    capabilities: &[String],
    reasoning: &str,
    timeout: Option<u64>,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let capabilities = CapabilitySet::parse(capabilities)?;
    let reasoning: ReasoningLevel = reasoning.parse()?;

    let request = InvocationRequest::new(prompt, capabilities, reasoning);
    let mut invoker_settings = config.invoker_settings();
    // Same convention as the config file: 0 lifts the limit.
    if let Some(secs) = timeout {
        invoker_settings.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let settings = config.sequencer_settings();
    let cache = config.build_cache();
    let fingerprint = request.fingerprint();

    let invocation = match settings
        .use_cache
        .then(|| cache.get(&fingerprint))
        .flatten()
    {
        Some(output) => {
            debug!(fingerprint = %fingerprint.short(), "Cache hit");
            Invocation::from_cache(&request, fingerprint, output)
        }
        None => {
            let progress = Arc::new(RunProgress::new("Invoking claude", !cli.quiet));
            let invoker =
                ProcessInvoker::new(invoker_settings).with_sink(progress.clone());
            let result = invoker.invoke(&request).await;
            progress.finish();
            let invocation = match result {
                Ok(invocation) => invocation,
                Err(e) => bail!("{}: {}", e.kind(), e),
            };

            if invocation.succeeded()
                && settings.use_cache
                && let Err(e) = cache.put(&fingerprint, invocation.output(), settings.cache_ttl)
            {
                warn!(error = %e, "Failed to store result in cache");
            }
            invocation
        }
    };

    if !invocation.succeeded() {
        let diagnostic = invocation.diagnostic();
        if !diagnostic.is_empty() {
            eprintln!("{}", diagnostic);
        }
        bail!(
            "{}: {}",
            invocation
                .status
                .failure_kind()
                .map(|k| k.as_str())
                .unwrap_or("invocation-failed"),
            invocation.status
        );
    }

    print!("{}", invocation.output());
    if !invocation.output().ends_with('\n') {
        println!();
    }
    Ok(())
}
