//! Template command - generate the object list locally

use console::style;
use std::io::Write;

use cort_core::to_documents;
use cort_engine::Generator;

use super::SourceArgs;
use crate::error::{CliError, Result};

pub fn run(source: &SourceArgs, show_parameters: bool) -> Result<()> {
    let prepared = source.prepare()?;

    if show_parameters {
        let yaml = serde_yaml::to_string(prepared.parameters.inner()).map_err(|e| {
            CliError::Other {
                message: format!("failed to serialize parameters: {}", e),
            }
        })?;
        eprintln!("{}", style("# Parameters").cyan().bold().for_stderr());
        eprintln!("{}", yaml);
    }

    let objects = prepared.generator.generate(
        &prepared.namespace,
        &prepared.name,
        &prepared.parameters,
    )?;
    tracing::info!(objects = objects.len(), "generated objects");

    let output = to_documents(&objects)?;
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(output.as_bytes())
        .map_err(|e| CliError::io("failed to write output", e))?;

    Ok(())
}
