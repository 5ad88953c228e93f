//! Driver for current sites
//!
//! Current sites support taxonomy and store one permission row per grant.

use crate::core::SiteCore;
use crate::environment::RequestContext;
use crate::FixtureDriver;
use cardtest_common::site::PermissionLayout;
use cardtest_common::{
    CronReport, DriverError, Fixture, Result, RoleId, TestNode, TestRole, TestTerm, TestUser,
    UserId,
};
use std::path::{Path, PathBuf};
use tracing::debug;

const NAME: &str = "current core";

pub struct CurrentCore {
    core: SiteCore,
}

impl CurrentCore {
    pub fn new(root: impl Into<PathBuf>, uri: impl Into<String>) -> Self {
        Self {
            core: SiteCore::new(NAME, root, uri),
        }
    }

    pub fn root(&self) -> &Path {
        self.core.root()
    }

    /// Site directory chosen during bootstrap
    pub fn conf_dir(&self) -> Option<&str> {
        self.core.conf_dir()
    }
}

impl FixtureDriver for CurrentCore {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bootstrap(&mut self) -> Result<()> {
        if self.core.is_bootstrapped() {
            return Ok(());
        }
        let context = self.validate_environment(self.core.uri())?;
        self.core.bootstrap(context)
    }

    fn request_context(&self) -> Option<&RequestContext> {
        self.core.request_context()
    }

    fn create_user(&self, user: &mut TestUser) -> Result<()> {
        self.core.create_user(user)
    }

    fn delete_user(&self, user: &TestUser) -> Result<()> {
        self.core.delete_user(user)
    }

    fn add_role(&self, user: &mut TestUser, role_name: &str) -> Result<()> {
        self.core.add_role(user, role_name)
    }

    fn authenticate(&self, name: &str, pass: &str) -> Result<Option<UserId>> {
        self.core.authenticate(name, pass)
    }

    fn create_node(&self, node: &mut TestNode) -> Result<()> {
        self.core.create_node(node)
    }

    fn delete_node(&self, node: &TestNode) -> Result<()> {
        self.core.delete_node(node)
    }

    fn create_term(&self, term: &mut TestTerm) -> Result<()> {
        let site = self.core.site()?;
        let vid = site
            .vocabulary_id(&term.vocabulary)?
            .ok_or_else(|| DriverError::not_found("vocabulary", &term.vocabulary))?;
        if let Some(parent) = term.parent {
            if !site.term_exists(parent)? {
                return Err(DriverError::not_found("term", parent));
            }
        }

        let tid = site.save_term(vid, term)?;
        term.tid = Some(tid);

        debug!("Created term \"{}\" in {} ({})", term.name, term.vocabulary, tid);
        Ok(())
    }

    fn delete_term(&self, term: &TestTerm) -> Result<()> {
        let site = self.core.site()?;
        let tid = term
            .tid
            .ok_or_else(|| DriverError::not_found("term", &term.name))?;

        if !site.delete_term(tid)? {
            return Err(DriverError::not_found("term", tid));
        }
        Ok(())
    }

    fn create_role(&self, permissions: &[String]) -> Result<TestRole> {
        self.core.create_role(permissions, PermissionLayout::PerRow)
    }

    fn delete_role(&self, rid: RoleId) -> Result<()> {
        self.core.delete_role(rid)
    }

    fn clear_cache(&self) -> Result<()> {
        self.core.clear_cache()
    }

    fn run_cron(&self) -> Result<CronReport> {
        self.core.site()?.cron_run()
    }

    fn set_variable(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        self.core.site()?.db().variable_set(name, value)
    }

    fn variable(&self, name: &str) -> Result<Option<serde_json::Value>> {
        self.core.site()?.db().variable_get(name)
    }

    fn extension_paths(&self) -> Result<Vec<PathBuf>> {
        self.core.extension_paths()
    }

    fn exists(&self, fixture: &Fixture) -> Result<bool> {
        self.core.exists(fixture)
    }
}
