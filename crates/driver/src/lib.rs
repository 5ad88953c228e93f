//! CardTest fixture drivers
//!
//! A [`FixtureDriver`] creates and deletes ephemeral users, nodes, terms and
//! roles against one version of the site backend. The harness picks a single
//! implementation at startup through [`build_driver`] and never mixes them
//! within a run. Every entity a scenario creates goes into a
//! [`FixtureRegistry`], which deletes them all when the scenario ends.
//!
//! ```text
//! ┌──────────────┐   bootstrap()    ┌─────────────────────────┐
//! │   harness    │ ───────────────▶ │ FixtureDriver           │
//! │  (scenario)  │   create_*()     │  ├── LegacyCore         │──▶ Site
//! │              │ ───────────────▶ │  ├── CurrentCore        │──▶ Site
//! └──────┬───────┘                  │  └── BlackboxCore       │
//!        │ register()               └────────────▲────────────┘
//!        ▼                                       │ delete_*()
//! ┌──────────────┐        teardown()             │
//! │ FixtureReg.  │ ──────────────────────────────┘
//! └──────────────┘
//! ```

pub mod blackbox;
mod core;
pub mod current;
pub mod environment;
pub mod legacy;
pub mod registry;

pub use blackbox::BlackboxCore;
pub use current::CurrentCore;
pub use environment::{RequestContext, DEFAULT_URI};
pub use legacy::LegacyCore;
pub use registry::{FixtureRegistry, RegistryEntry, TeardownReport};

use cardtest_common::{
    CronReport, DriverError, Fixture, Result, RoleId, TestNode, TestRole, TestTerm, TestUser,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Fixture lifecycle operations against one backend version
pub trait FixtureDriver {
    /// Short label used in logs and unsupported-operation errors
    fn name(&self) -> &'static str;

    /// Establish the backend connection; later calls are no-ops
    fn bootstrap(&mut self) -> Result<()>;

    /// Context recorded by the first successful bootstrap
    fn request_context(&self) -> Option<&RequestContext>;

    /// Derive the request context the backend needs to serve `uri`
    fn validate_environment(&self, uri: &str) -> Result<RequestContext> {
        RequestContext::from_uri(uri)
    }

    /// Create an account, defaulting status to active and filling in `uid`
    fn create_user(&self, user: &mut TestUser) -> Result<()>;

    fn delete_user(&self, user: &TestUser) -> Result<()>;

    /// Grant an existing role by name
    fn add_role(&self, user: &mut TestUser, role_name: &str) -> Result<()>;

    /// Check credentials, returning the matching active account
    fn authenticate(&self, name: &str, pass: &str) -> Result<Option<UserId>>;

    /// Create a node, defaulting status to published and filling in `nid`
    fn create_node(&self, node: &mut TestNode) -> Result<()>;

    fn delete_node(&self, node: &TestNode) -> Result<()>;

    fn create_term(&self, term: &mut TestTerm) -> Result<()>;

    fn delete_term(&self, term: &TestTerm) -> Result<()>;

    /// Create a role holding exactly `permissions`, all of which must exist
    fn create_role(&self, permissions: &[String]) -> Result<TestRole>;

    fn delete_role(&self, rid: RoleId) -> Result<()>;

    fn clear_cache(&self) -> Result<()>;

    fn run_cron(&self) -> Result<CronReport>;

    fn set_variable(&self, name: &str, value: &serde_json::Value) -> Result<()>;

    fn variable(&self, name: &str) -> Result<Option<serde_json::Value>>;

    /// Absolute paths of enabled extensions
    fn extension_paths(&self) -> Result<Vec<PathBuf>>;

    /// Whether the entity behind a handle still exists in the backend
    fn exists(&self, fixture: &Fixture) -> Result<bool>;
}

/// Backend generation a driver targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreVersion {
    /// Sites without taxonomy support; permissions stored joined
    Legacy,
    #[default]
    Current,
    /// No backend at all
    Blackbox,
}

impl fmt::Display for CoreVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreVersion::Legacy => write!(f, "legacy"),
            CoreVersion::Current => write!(f, "current"),
            CoreVersion::Blackbox => write!(f, "blackbox"),
        }
    }
}

impl FromStr for CoreVersion {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(CoreVersion::Legacy),
            "current" => Ok(CoreVersion::Current),
            "blackbox" => Ok(CoreVersion::Blackbox),
            other => Err(DriverError::Configuration(format!(
                "Unknown core version \"{}\" (expected legacy, current or blackbox)",
                other
            ))),
        }
    }
}

/// What the harness supplies to construct a driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Backend root directory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Target URI, or `default`
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default)]
    pub core: CoreVersion,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            uri: default_uri(),
            core: CoreVersion::default(),
        }
    }
}

/// Construct the driver selected by `settings.core`
pub fn build_driver(settings: &DriverSettings) -> Box<dyn FixtureDriver> {
    match settings.core {
        CoreVersion::Legacy => Box::new(LegacyCore::new(&settings.root, &settings.uri)),
        CoreVersion::Current => Box::new(CurrentCore::new(&settings.root, &settings.uri)),
        CoreVersion::Blackbox => Box::new(BlackboxCore::new(&settings.uri)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_version_parse() {
        assert_eq!("Legacy".parse::<CoreVersion>().unwrap(), CoreVersion::Legacy);
        assert_eq!("blackbox".parse::<CoreVersion>().unwrap(), CoreVersion::Blackbox);
        assert!("ancient".parse::<CoreVersion>().is_err());
        assert_eq!(CoreVersion::Current.to_string(), "current");
    }

    #[test]
    fn test_build_driver_selects_core() {
        let mut settings = DriverSettings::default();
        assert_eq!(build_driver(&settings).name(), "current core");
        settings.core = CoreVersion::Legacy;
        assert_eq!(build_driver(&settings).name(), "legacy core");
        settings.core = CoreVersion::Blackbox;
        assert_eq!(build_driver(&settings).name(), "blackbox");
    }
}
