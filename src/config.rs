//! Extraction settings
//!
//! Defaults, overlaid by an optional JSON file, overlaid by CLI flags.

use crate::browsers::ArtifactKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Gecko master password; empty when the profile has none
    pub master_password: String,
    /// Upper bound on artifact kinds extracted at once
    pub workers: usize,
    pub kinds: Vec<ArtifactKind>,
    pub format: OutputFormat,
    pub deadline_secs: Option<u64>,
    /// Browser name, used to pick the macOS keychain entry
    pub browser: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            master_password: String::new(),
            workers: 4,
            kinds: ArtifactKind::ALL.to_vec(),
            format: OutputFormat::Json,
            deadline_secs: None,
            browser: "chrome".to_string(),
        }
    }
}

impl fmt::Debug for ExtractConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractConfig")
            .field("master_password", &if self.master_password.is_empty() { "" } else { "***" })
            .field("workers", &self.workers)
            .field("kinds", &self.kinds)
            .field("format", &self.format)
            .field("deadline_secs", &self.deadline_secs)
            .field("browser", &self.browser)
            .finish()
    }
}

impl ExtractConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {:?}", path))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// At least one worker, whatever the file said.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExtractConfig::default();
        assert_eq!(config.master_password, "");
        assert_eq!(config.workers, 4);
        assert_eq!(config.kinds.len(), 6);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.deadline().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": 0, "kinds": ["login", "credit_card"], "format": "csv"}}"#).unwrap();

        let config = ExtractConfig::load(file.path()).unwrap();
        assert_eq!(config.kinds, vec![ArtifactKind::Login, ArtifactKind::CreditCard]);
        assert_eq!(config.format, OutputFormat::Csv);
        assert_eq!(config.worker_count(), 1);
        assert_eq!(config.browser, "chrome");
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "workers = 3").unwrap();
        assert!(ExtractConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ExtractConfig {
            master_password: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
