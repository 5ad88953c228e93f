//! Core fixture types for CardTest

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Backend-assigned user identifier
    UserId
);
entity_id!(
    /// Backend-assigned node identifier
    NodeId
);
entity_id!(
    /// Backend-assigned taxonomy term identifier
    TermId
);
entity_id!(
    /// Backend-assigned role identifier
    RoleId
);

/// Kind of fixture tracked by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Node,
    Term,
    Role,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Node => write!(f, "node"),
            EntityKind::Term => write!(f, "term"),
            EntityKind::Role => write!(f, "role"),
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Blocked,
}

impl UserStatus {
    pub fn as_flag(self) -> i64 {
        match self {
            UserStatus::Active => 1,
            UserStatus::Blocked => 0,
        }
    }

    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 {
            UserStatus::Blocked
        } else {
            UserStatus::Active
        }
    }
}

/// Publication status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Published,
    Unpublished,
}

impl NodeStatus {
    pub fn as_flag(self) -> i64 {
        match self {
            NodeStatus::Published => 1,
            NodeStatus::Unpublished => 0,
        }
    }
}

/// A user fixture
///
/// `pass` always holds the plaintext password; drivers hash a private copy
/// when storing the account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestUser {
    pub name: String,
    pub pass: String,
    pub mail: String,
    #[serde(default)]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub uid: Option<UserId>,
}

impl TestUser {
    pub fn new(name: impl Into<String>, pass: impl Into<String>, mail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pass: pass.into(),
            mail: mail.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// A content node fixture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestNode {
    pub node_type: String,
    pub title: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub status: Option<NodeStatus>,
    #[serde(default)]
    pub author: Option<UserId>,
    #[serde(default)]
    pub nid: Option<NodeId>,
}

impl TestNode {
    pub fn new(node_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A taxonomy term fixture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTerm {
    pub vocabulary: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent: Option<TermId>,
    #[serde(default)]
    pub tid: Option<TermId>,
}

impl TestTerm {
    pub fn new(vocabulary: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            vocabulary: vocabulary.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A role fixture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRole {
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default)]
    pub rid: Option<RoleId>,
}

/// Any fixture handle held by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    User(TestUser),
    Node(TestNode),
    Term(TestTerm),
    Role(TestRole),
}

impl Fixture {
    pub fn kind(&self) -> EntityKind {
        match self {
            Fixture::User(_) => EntityKind::User,
            Fixture::Node(_) => EntityKind::Node,
            Fixture::Term(_) => EntityKind::Term,
            Fixture::Role(_) => EntityKind::Role,
        }
    }

    /// Backend identifier rendered as text, `None` until assigned
    pub fn id(&self) -> Option<String> {
        match self {
            Fixture::User(u) => u.uid.map(|id| id.to_string()),
            Fixture::Node(n) => n.nid.map(|id| id.to_string()),
            Fixture::Term(t) => t.tid.map(|id| id.to_string()),
            Fixture::Role(r) => r.rid.map(|id| id.to_string()),
        }
    }

    /// Human label used in logs when no identifier exists
    pub fn label(&self) -> &str {
        match self {
            Fixture::User(u) => &u.name,
            Fixture::Node(n) => &n.title,
            Fixture::Term(t) => &t.name,
            Fixture::Role(r) => &r.name,
        }
    }
}

impl From<TestUser> for Fixture {
    fn from(user: TestUser) -> Self {
        Fixture::User(user)
    }
}

impl From<TestNode> for Fixture {
    fn from(node: TestNode) -> Self {
        Fixture::Node(node)
    }
}

impl From<TestTerm> for Fixture {
    fn from(term: TestTerm) -> Self {
        Fixture::Term(term)
    }
}

impl From<TestRole> for Fixture {
    fn from(role: TestRole) -> Self {
        Fixture::Role(role)
    }
}

/// Outcome of a backend cron run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronReport {
    pub ran_at: i64,
    pub expired_cache_entries: usize,
}
