//! Loads pipeline files: `${NAME}` expansion, then YAML deserialization.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::PipelineConfig;

/// `${NAME}` or `${NAME:-fallback}`.
static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env var regex")
});

/// Expand `${NAME}` references from the environment. `${NAME:-fallback}`
/// uses `fallback` when `NAME` is unset or empty.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is unset and has
/// no fallback.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = BTreeSet::new();
    let expanded = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        let name = &cap[1];
        match (std::env::var(name), cap.get(2)) {
            (Ok(value), _) if !value.is_empty() => value,
            (_, Some(fallback)) => fallback.as_str().to_string(),
            (Ok(value), None) => value,
            (Err(_), None) => {
                missing.insert(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        let names: Vec<_> = missing.into_iter().collect();
        anyhow::bail!("Missing environment variable(s): {}", names.join(", "));
    }
    Ok(expanded.into_owned())
}

/// Expand environment references in `yaml`, then deserialize it.
///
/// # Errors
///
/// Fails on an unresolved variable or YAML that does not match
/// [`PipelineConfig`].
pub fn parse_pipeline_str(yaml: &str) -> Result<PipelineConfig> {
    let expanded = substitute_env_vars(yaml)?;
    serde_yaml::from_str(&expanded).context("Failed to parse pipeline YAML")
}

/// Read and parse the pipeline file at `path`.
///
/// # Errors
///
/// Fails when the file is unreadable, or as [`parse_pipeline_str`] does.
pub fn parse_pipeline(path: &Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    parse_pipeline_str(&text)
}
