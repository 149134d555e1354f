// src/config/validate.rs

use anyhow::{bail, Context, Result};

use crate::config::model::ChartDefinition;

/// File-level checks on one chart definition: required fields, paths that
/// exist, a parsable timeout, and no empty dependency names.
///
/// Graph-level validation (unknown dependencies, cycles) happens in the
/// core library once definitions are converted to charts.
pub fn validate_definition(def: &ChartDefinition) -> Result<()> {
    if def.name.is_empty() {
        bail!("name is empty");
    }
    if def.path.is_empty() {
        bail!("path is empty");
    }
    std::fs::metadata(&def.path).with_context(|| format!("error with path '{}'", def.path))?;
    if let Some(values_path) = &def.values_path {
        std::fs::metadata(values_path)
            .with_context(|| format!("error with values_path '{values_path}'"))?;
    }
    if let Some(timeout) = &def.timeout {
        humantime::parse_duration(timeout)
            .with_context(|| format!("error with timeout '{timeout}'"))?;
    }
    for (offset, dep) in def.dependencies.iter().enumerate() {
        if dep.is_empty() {
            bail!("empty string in dependencies at offset {offset}");
        }
    }
    Ok(())
}
