//! Shared setup for driver integration tests

#![allow(dead_code)]

use cardtest_common::Site;
use cardtest_driver::{CurrentCore, FixtureDriver, LegacyCore};
use tempfile::TempDir;

/// A freshly installed site under a temporary root
pub struct TestSite {
    pub dir: TempDir,
    pub site: Site,
}

impl TestSite {
    pub fn install() -> Self {
        Self::install_at("default")
    }

    pub fn install_at(conf_dir: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp root");
        let site = Site::install(dir.path(), conf_dir).expect("install site");
        Self { dir, site }
    }

    pub fn current(&self) -> CurrentCore {
        let mut driver = CurrentCore::new(self.dir.path(), "default");
        driver.bootstrap().expect("bootstrap current core");
        driver
    }

    pub fn legacy(&self) -> LegacyCore {
        let mut driver = LegacyCore::new(self.dir.path(), "default");
        driver.bootstrap().expect("bootstrap legacy core");
        driver
    }

    pub fn count(&self, table: &str) -> i64 {
        self.site.db().count(table).expect("count rows")
    }
}
