use anyhow::{Context, Result};
use ostinato_core::config::KernelConfig;
use std::{fs, path::Path};

/// Load and validate a kernel configuration file
pub fn load<P: AsRef<Path>>(path: P) -> Result<KernelConfig> {
    let path = path.as_ref();
    let config = from_file(path)?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Load configuration from a file, auto-detecting TOML or JSON format
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<KernelConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => from_toml(&content),
        Some("json") => from_json(&content),
        // TOML first, then JSON
        _ => from_toml(&content).or_else(|_| from_json(&content)),
    }
}

/// Parse configuration from TOML string
pub fn from_toml(content: &str) -> Result<KernelConfig> {
    toml::from_str(content).context("failed to parse config as TOML")
}

/// Parse configuration from JSON string
pub fn from_json(content: &str) -> Result<KernelConfig> {
    serde_json::from_str(content).context("failed to parse config as JSON")
}
