//! Output formatting utilities

use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::core::identity::EntityId;

/// Print `value` in a machine format. Returns `false` when the caller should
/// print its human-readable summary instead.
pub fn emit<T: Serialize>(value: &T, id: Option<&EntityId>, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(value).into_diagnostic()?;
            print!("{}", yaml);
            Ok(true)
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).into_diagnostic()?;
            println!("{}", json);
            Ok(true)
        }
        OutputFormat::Id => {
            if let Some(id) = id {
                println!("{}", id);
            }
            Ok(true)
        }
        OutputFormat::Auto => Ok(false),
    }
}
