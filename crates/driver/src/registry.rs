//! Tracking and cleanup of fixtures created during a scenario

use crate::FixtureDriver;
use cardtest_common::{
    DriverError, EntityKind, Fixture, Result, TeardownError, TeardownFailure,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One tracked fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub kind: EntityKind,
    /// Backend identifier at registration time
    pub id: Option<String>,
    pub fixture: Fixture,
}

impl RegistryEntry {
    fn describe(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| self.fixture.label().to_string())
    }
}

/// Summary of a teardown in which every deletion succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub deleted: usize,
}

/// Fixtures created during one scenario, in creation order
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    entries: Vec<RegistryEntry>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a fixture for deletion at teardown
    pub fn register(&mut self, fixture: impl Into<Fixture>) {
        let fixture = fixture.into();
        let entry = RegistryEntry {
            kind: fixture.kind(),
            id: fixture.id(),
            fixture,
        };
        debug!("Registered {} {}", entry.kind, entry.describe());
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delete every tracked fixture, newest first
    ///
    /// A failed deletion does not stop the sweep. Once every entry has been
    /// attempted, all failures are returned together as
    /// [`DriverError::Teardown`]. The registry is empty afterwards either way,
    /// so no entry is ever deleted twice.
    pub fn teardown(&mut self, driver: &dyn FixtureDriver) -> Result<TeardownReport> {
        let mut report = TeardownReport::default();
        let mut failures = Vec::new();

        while let Some(entry) = self.entries.pop() {
            match delete_fixture(driver, &entry.fixture) {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!("Failed to delete {} {}: {}", entry.kind, entry.describe(), e);
                    failures.push(TeardownFailure {
                        kind: entry.kind,
                        id: entry.describe(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            debug!("Teardown removed {} fixture(s)", report.deleted);
            Ok(report)
        } else {
            Err(DriverError::Teardown(TeardownError {
                failures,
                deleted: report.deleted,
            }))
        }
    }
}

fn delete_fixture(driver: &dyn FixtureDriver, fixture: &Fixture) -> Result<()> {
    match fixture {
        Fixture::User(user) => driver.delete_user(user),
        Fixture::Node(node) => driver.delete_node(node),
        Fixture::Term(term) => driver.delete_term(term),
        Fixture::Role(role) => match role.rid {
            Some(rid) => driver.delete_role(rid),
            None => Err(DriverError::not_found("role", &role.name)),
        },
    }
}
