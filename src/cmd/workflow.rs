//! Workflow lookup and validation: `conductor validate`.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::{Path, PathBuf};

use conductor::config::STATE_DIR;
use conductor::template::Parameters;
use conductor::ui::icons::{CHECK, CROSS};
use conductor::workflow::Workflow;

const EXTENSIONS: [&str; 4] = ["yaml", "yml", "json", "toml"];

/// Directories searched for a workflow given by name: the project's
/// `.conductor/workflows`, then the user's config dir.
fn search_dirs(project_dir: &Path) -> Vec<PathBuf> {
    let mut searched = vec![project_dir.join(STATE_DIR).join("workflows")];
    if let Some(config_dir) = dirs::config_dir() {
        searched.push(config_dir.join("conductor").join("workflows"));
    }
    searched
}

/// Resolve a workflow argument: an existing path, or a name to look up.
pub fn resolve_workflow(project_dir: &Path, arg: &str) -> Result<PathBuf> {
    let direct = PathBuf::from(arg);
    let direct = if direct.is_relative() {
        project_dir.join(direct)
    } else {
        direct
    };
    if direct.is_file() {
        return Ok(direct);
    }

    let searched = search_dirs(project_dir);
    for dir in &searched {
        for ext in EXTENSIONS {
            let candidate = dir.join(format!("{}.{}", arg, ext));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    bail!(
        "Workflow '{}' not found (searched the path itself and {})",
        arg,
        searched
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

pub fn load_workflow(project_dir: &Path, arg: &str) -> Result<Workflow> {
    let path = resolve_workflow(project_dir, arg)?;
    Workflow::load(&path).with_context(|| format!("Invalid workflow {}", path.display()))
}

/// Build run parameters from `KEY=VALUE` pairs.
pub fn parse_params(arguments: &str, pairs: &[String]) -> Result<Parameters> {
    let mut params = Parameters::new().with_arguments(arguments);
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid parameter '{}': expected KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid parameter '{}': empty key", pair);
        }
        params = params.with_value(key, value);
    }
    Ok(params)
}

pub fn cmd_validate(project_dir: &Path, workflows: &[String]) -> Result<()> {
    let mut failures = 0;
    for arg in workflows {
        match load_workflow(project_dir, arg) {
            Ok(workflow) => {
                println!(
                    "{}{} ({} steps)",
                    CHECK,
                    style(workflow.name()).bold(),
                    workflow.steps().len()
                );
                for (index, step) in workflow.steps().iter().enumerate() {
                    println!(
                        "    {}. {} [{}] reasoning={}{}",
                        index + 1,
                        step.name(),
                        step.capabilities(),
                        step.reasoning(),
                        if step.continues_on_failure() {
                            ", continue-on-failure"
                        } else {
                            ""
                        }
                    );
                }
                let required = workflow.required_parameters();
                if !required.is_empty() {
                    println!(
                        "    parameters: {}",
                        required.into_iter().collect::<Vec<_>>().join(", ")
                    );
                }
            }
            Err(e) => {
                failures += 1;
                println!("{}{}: {:#}", CROSS, arg, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} workflow(s) invalid", failures, workflows.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_params() {
        let params = parse_params("X", &["feature=login".into(), "expr=a=b".into()]).unwrap();
        assert_eq!(params.arguments, "X");
        assert_eq!(params.get("feature"), Some("login"));
        assert_eq!(params.get("expr"), Some("a=b"));
        assert!(parse_params("", &["novalue".into()]).is_err());
        assert!(parse_params("", &["=x".into()]).is_err());
    }

    #[test]
    fn test_resolve_by_path_and_name() {
        let dir = tempdir().unwrap();
        let wf_dir = dir.path().join(STATE_DIR).join("workflows");
        fs::create_dir_all(&wf_dir).unwrap();
        fs::write(wf_dir.join("tdd.yml"), "name: tdd\nsteps: []\n").unwrap();
        fs::write(dir.path().join("local.json"), "{}").unwrap();

        assert_eq!(
            resolve_workflow(dir.path(), "tdd").unwrap(),
            wf_dir.join("tdd.yml")
        );
        assert_eq!(
            resolve_workflow(dir.path(), "local.json").unwrap(),
            dir.path().join("local.json")
        );
        assert!(resolve_workflow(dir.path(), "nope").is_err());
    }
}
