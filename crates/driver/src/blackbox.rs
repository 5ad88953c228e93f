//! Driver for runs without backend access
//!
//! Only the request context is available; every fixture operation reports
//! that it is unsupported.

use crate::environment::RequestContext;
use crate::FixtureDriver;
use cardtest_common::{
    CronReport, DriverError, Fixture, Result, RoleId, TestNode, TestRole, TestTerm, TestUser,
    UserId,
};
use std::path::PathBuf;
use tracing::info;

const NAME: &str = "blackbox";

pub struct BlackboxCore {
    uri: String,
    context: Option<RequestContext>,
}

impl BlackboxCore {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            context: None,
        }
    }

    fn unsupported<T>(operation: &'static str) -> Result<T> {
        Err(DriverError::UnsupportedOperation {
            operation,
            driver: NAME,
        })
    }
}

impl FixtureDriver for BlackboxCore {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bootstrap(&mut self) -> Result<()> {
        if self.context.is_none() {
            let context = self.validate_environment(&self.uri)?;
            info!("Blackbox driver targeting {}", context.http_host);
            self.context = Some(context);
        }
        Ok(())
    }

    fn request_context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    fn create_user(&self, _user: &mut TestUser) -> Result<()> {
        Self::unsupported("create users")
    }

    fn delete_user(&self, _user: &TestUser) -> Result<()> {
        Self::unsupported("delete users")
    }

    fn add_role(&self, _user: &mut TestUser, _role_name: &str) -> Result<()> {
        Self::unsupported("add roles")
    }

    fn authenticate(&self, _name: &str, _pass: &str) -> Result<Option<UserId>> {
        Self::unsupported("authenticate users")
    }

    fn create_node(&self, _node: &mut TestNode) -> Result<()> {
        Self::unsupported("create nodes")
    }

    fn delete_node(&self, _node: &TestNode) -> Result<()> {
        Self::unsupported("delete nodes")
    }

    fn create_term(&self, _term: &mut TestTerm) -> Result<()> {
        Self::unsupported("create terms")
    }

    fn delete_term(&self, _term: &TestTerm) -> Result<()> {
        Self::unsupported("delete terms")
    }

    fn create_role(&self, _permissions: &[String]) -> Result<TestRole> {
        Self::unsupported("create roles")
    }

    fn delete_role(&self, _rid: RoleId) -> Result<()> {
        Self::unsupported("delete roles")
    }

    fn clear_cache(&self) -> Result<()> {
        Self::unsupported("clear the cache")
    }

    fn run_cron(&self) -> Result<CronReport> {
        Self::unsupported("run cron")
    }

    fn set_variable(&self, _name: &str, _value: &serde_json::Value) -> Result<()> {
        Self::unsupported("set variables")
    }

    fn variable(&self, _name: &str) -> Result<Option<serde_json::Value>> {
        Self::unsupported("read variables")
    }

    fn extension_paths(&self) -> Result<Vec<PathBuf>> {
        Self::unsupported("list extensions")
    }

    fn exists(&self, _fixture: &Fixture) -> Result<bool> {
        Self::unsupported("look up fixtures")
    }
}
