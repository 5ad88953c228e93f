//! Error types for the scenario harness

use cardtest_common::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("No current user; create one with a `user` step first")]
    NoCurrentUser,

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Login failed for user {0}")]
    LoginFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
