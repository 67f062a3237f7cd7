use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use std::time::Duration;
use anyhow::{Context, Result};

use crate::cli::OutputFormat;
use crate::scanner::ScanOptions;

/// Central configuration for tcpscan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scanning: ScanConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Per-port connect timeout in milliseconds
    pub default_timeout: u64,
    pub default_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub default_format: String,
    pub color_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scanning: ScanConfig {
                default_timeout: 1000,
                default_concurrency: 100,
            },
            output: OutputConfig {
                default_format: "human".to_string(),
                color_enabled: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the standard config directory.
    ///
    /// A missing file in the standard location yields the defaults; an
    /// explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Self::get_config_path();
                if default_path.exists() {
                    Self::load_from(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Get the path to the config file
    pub fn get_config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("tcpscan");
        path.push("config.json");
        path
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.scanning.default_timeout == 0 {
            return Err(anyhow::anyhow!("default_timeout must be greater than 0"));
        }

        if self.scanning.default_concurrency == 0 {
            return Err(anyhow::anyhow!("default_concurrency must be greater than 0"));
        }

        self.default_format()?;
        Ok(())
    }

    pub fn default_format(&self) -> Result<OutputFormat> {
        match self.output.default_format.as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(anyhow::anyhow!(
                "default_format must be one of: human, json, csv"
            )),
        }
    }

    /// Merge command-line overrides with the configured defaults
    pub fn effective_scan_options(
        &self,
        timeout_ms: Option<u64>,
        concurrency: Option<usize>,
    ) -> Result<ScanOptions> {
        let timeout = timeout_ms.unwrap_or(self.scanning.default_timeout);
        let concurrency = concurrency.unwrap_or(self.scanning.default_concurrency);

        if timeout == 0 {
            return Err(anyhow::anyhow!("timeout must be greater than 0"));
        }
        if concurrency == 0 {
            return Err(anyhow::anyhow!("concurrency must be greater than 0"));
        }

        Ok(ScanOptions {
            concurrency,
            timeout: Duration::from_millis(timeout),
        })
    }

    pub fn effective_format(&self, format: Option<OutputFormat>) -> Result<OutputFormat> {
        match format {
            Some(format) => Ok(format),
            None => self.default_format(),
        }
    }

    pub fn effective_color(&self, no_color: bool) -> bool {
        self.output.color_enabled && !no_color
    }
}
