// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use helmdag::{Chart, HealthIndication};

use crate::config::model::ChartDefinition;
use crate::config::validate::validate_definition;

/// Read a YAML chart definitions file, expand relative paths against the
/// file's directory, and validate every definition.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Vec<ChartDefinition>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading chart definitions at {path:?}"))?;

    let mut definitions: Vec<ChartDefinition> = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing YAML chart definitions from {path:?}"))?;
    if definitions.is_empty() {
        bail!("file {path:?} contains no chart definitions");
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    expand_definition_paths(&mut definitions, base_dir);

    for (offset, def) in definitions.iter().enumerate() {
        validate_definition(def)
            .with_context(|| format!("validating chart at offset {offset}"))?;
    }
    Ok(definitions)
}

/// Resolve relative `path` / `values_path` entries against the directory
/// containing the input file.
fn expand_definition_paths(definitions: &mut [ChartDefinition], base_dir: &Path) {
    for def in definitions.iter_mut() {
        def.path = expand_file_path(&def.path, base_dir);
        if let Some(values_path) = def.values_path.take() {
            def.values_path = Some(expand_file_path(&values_path, base_dir));
        }
    }
}

fn expand_file_path(file_path: &str, base_dir: &Path) -> String {
    let path = Path::new(file_path);
    if path.is_absolute() {
        file_path.to_string()
    } else {
        base_dir.join(path).display().to_string()
    }
}

/// Convert validated definitions into the core chart model, reading each
/// values file into its override blob.
pub fn definitions_to_charts(definitions: &[ChartDefinition]) -> Result<Vec<Chart>> {
    definitions.iter().map(definition_to_chart).collect()
}

fn definition_to_chart(def: &ChartDefinition) -> Result<Chart> {
    let value_overrides = match &def.values_path {
        Some(values_path) => fs::read(values_path)
            .with_context(|| format!("reading values file '{values_path}'"))?,
        None => Vec::new(),
    };

    let wait_timeout = match &def.timeout {
        Some(timeout) => humantime::parse_duration(timeout)
            .with_context(|| format!("parsing timeout '{timeout}'"))?,
        None => std::time::Duration::ZERO,
    };

    let mut primary_deployment = def.primary_deployment.clone().unwrap_or_default();
    let mut health_indication = if primary_deployment.is_empty() {
        HealthIndication::IgnorePodHealth
    } else if def.wait_for_all_pods {
        HealthIndication::AllPodsHealthy
    } else {
        HealthIndication::AtLeastOnePodHealthy
    };
    // Helm's own readiness signal replaces deployment polling entirely.
    if def.wait_for_helm {
        primary_deployment.clear();
        health_indication = HealthIndication::IgnorePodHealth;
    }

    Ok(Chart {
        title: def.name.clone(),
        location: def.path.clone(),
        value_overrides,
        dependency_list: def.dependencies.clone(),
        wait_until_deployment: primary_deployment,
        wait_until_helm_ready: def.wait_for_helm,
        wait_timeout,
        health_indication,
    })
}
