//! Plan command - run one reconciliation pass against a previous status
//!
//! Actions go to stderr; the next status is written to stdout as YAML so it
//! can be fed back with `--status` once the actions have been carried out.

use chrono::Utc;
use console::style;
use std::io::Write;
use std::path::Path;

use cort_core::{ComponentResource, ComponentStatus};
use cort_kube::{Action, ActionKind, ComponentPass};

use super::SourceArgs;
use crate::error::{CliError, Result};

pub fn run(
    source: &SourceArgs,
    status_file: Option<&Path>,
    deleting: bool,
    generation: Option<i64>,
) -> Result<()> {
    let prepared = source.prepare()?;
    let now = Utc::now();

    let status = match status_file {
        Some(path) => load_status(path)?,
        None => ComponentStatus::default(),
    };

    let mut component = ComponentResource::new(prepared.namespace.clone(), prepared.name.clone())
        .with_values(&prepared.parameters);
    component.spec.target.namespace = prepared.namespace;
    component.spec.target.name = prepared.name;
    component.metadata.generation = generation.unwrap_or(status.observed_generation.max(1));
    if deleting {
        component.metadata.deletion_timestamp = Some(now);
    }
    component.status = status;

    let outcome = ComponentPass::new().run(&prepared.generator, &component, now);

    if outcome.actions.is_empty() {
        eprintln!("{}", style("No changes").dim().for_stderr());
    }
    for action in &outcome.actions {
        eprintln!("{}", format_action(action));
    }
    for error in &outcome.errors {
        eprintln!(
            "{} {}",
            style("warning:").yellow().bold().for_stderr(),
            error
        );
    }
    eprintln!(
        "{} {}",
        style("state:").bold().for_stderr(),
        outcome.status.state
    );

    let yaml = serde_yaml::to_string(&outcome.status).map_err(|e| CliError::Other {
        message: format!("failed to serialize status: {}", e),
    })?;
    std::io::stdout()
        .lock()
        .write_all(yaml.as_bytes())
        .map_err(|e| CliError::io("failed to write output", e))?;

    match outcome.error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn load_status(path: &Path) -> Result<ComponentStatus> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("failed to read {}", path.display()), e))?;
    if content.trim().is_empty() {
        return Ok(ComponentStatus::default());
    }
    serde_yaml::from_str(&content)
        .map_err(|e| CliError::input(format!("invalid status {}: {}", path.display(), e)))
}

fn format_action(action: &Action) -> String {
    let kind = format!("{:>8}", action.kind.to_string());
    let kind = match action.kind {
        ActionKind::Create => style(kind).green(),
        ActionKind::Update => style(kind).yellow(),
        ActionKind::Delete => style(kind).red(),
        ActionKind::Complete | ActionKind::Purge => style(kind).dim(),
    };
    format!("{} {}", kind.for_stderr(), action.key)
}
