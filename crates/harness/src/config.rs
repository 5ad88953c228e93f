//! Harness configuration

use cardtest_driver::DriverSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Backend the driver talks to
    #[serde(default)]
    pub backend: DriverSettings,

    /// Directory searched for scenario YAML files
    #[serde(default = "default_scenarios_dir")]
    pub scenarios_dir: PathBuf,

    /// Directory receiving result files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_scenarios_dir() -> PathBuf {
    PathBuf::from("tests/scenarios")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("test-results")
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend: DriverSettings::default(),
            scenarios_dir: default_scenarios_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the JSON results file
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join("scenario-results.json")
    }
}
