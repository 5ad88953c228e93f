//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Create a user; unset name, password and mail are generated.
    /// The new user becomes the current user.
    User {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        pass: Option<String>,
        #[serde(default)]
        mail: Option<String>,
        #[serde(default)]
        roles: Vec<String>,
        #[serde(default)]
        blocked: bool,
    },

    /// Create a user holding an existing role
    UserWithRole { role: String },

    /// Create a role with these permissions and a user holding it
    UserWithPermissions { permissions: Vec<String> },

    /// Grant an existing role to the current user, or to `user`
    AddRole {
        role: String,
        #[serde(default)]
        user: Option<String>,
    },

    /// Create a role with these permissions
    Role { permissions: Vec<String> },

    /// Create a node, authored by the current user when there is one
    Node {
        #[serde(rename = "type")]
        node_type: String,
        title: String,
        #[serde(default)]
        fields: BTreeMap<String, serde_json::Value>,
        #[serde(default)]
        published: Option<bool>,
    },

    /// Create a taxonomy term
    Term {
        vocabulary: String,
        name: String,
        #[serde(default)]
        description: String,
    },

    /// Set a site variable; with `json`, a string value is decoded first
    Variable {
        name: String,
        value: serde_json::Value,
        #[serde(default)]
        json: bool,
    },

    /// Ensure a file exists, creating parent directories
    File { path: PathBuf },

    /// Check the stored credentials of the current user, or of `user`
    Login {
        #[serde(default)]
        user: Option<String>,
    },

    ClearCache,

    RunCron,
}

impl Step {
    /// Short description for logs and results
    pub fn describe(&self) -> String {
        match self {
            Step::User { name, .. } => match name {
                Some(name) => format!("user {}", name),
                None => "user".to_string(),
            },
            Step::UserWithRole { role } => format!("user with the \"{}\" role", role),
            Step::UserWithPermissions { permissions } => {
                format!("user with permissions [{}]", permissions.join(", "))
            }
            Step::AddRole { role, user } => match user {
                Some(user) => format!("add role \"{}\" to {}", role, user),
                None => format!("add role \"{}\"", role),
            },
            Step::Role { permissions } => format!("role with [{}]", permissions.join(", ")),
            Step::Node { node_type, title, .. } => format!("{} node \"{}\"", node_type, title),
            Step::Term { vocabulary, name, .. } => format!("term \"{}\" in {}", name, vocabulary),
            Step::Variable { name, .. } => format!("variable {}", name),
            Step::File { path } => format!("file at {}", path.display()),
            Step::Login { user } => match user {
                Some(user) => format!("login as {}", user),
                None => "login".to_string(),
            },
            Step::ClearCache => "clear cache".to_string(),
            Step::RunCron => "run cron".to_string(),
        }
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            HarnessError::SpecParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all scenarios from a directory, sorted by path
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }
}
