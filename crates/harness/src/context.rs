//! Per-scenario state and the step dispatch table

use cardtest_common::{
    NodeStatus, RandomNames, TestNode, TestRole, TestTerm, TestUser, UserStatus,
};
use cardtest_driver::{FixtureDriver, FixtureRegistry, TeardownReport};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::scenario::Step;

const GENERATED_NAME_LEN: usize = 8;
const GENERATED_PASS_LEN: usize = 16;

/// Mail address given to users created without one
pub fn default_mail(name: &str) -> String {
    format!("john.smith{}@example.com", name)
}

/// User attributes a step supplies; anything left unset is generated
#[derive(Debug, Clone, Default)]
pub struct UserDraft {
    pub name: Option<String>,
    pub pass: Option<String>,
    pub mail: Option<String>,
    pub roles: BTreeSet<String>,
    pub status: Option<UserStatus>,
}

/// State carried through the steps of one scenario
pub struct ScenarioContext<'d> {
    driver: &'d dyn FixtureDriver,
    registry: FixtureRegistry,
    names: RandomNames,
    users: BTreeMap<String, TestUser>,
    current_user: Option<String>,
}

impl<'d> ScenarioContext<'d> {
    pub fn new(driver: &'d dyn FixtureDriver) -> Self {
        Self {
            driver,
            registry: FixtureRegistry::new(),
            names: RandomNames::new(),
            users: BTreeMap::new(),
            current_user: None,
        }
    }

    pub fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    /// User created under `name` in this scenario
    pub fn user(&self, name: &str) -> HarnessResult<&TestUser> {
        self.users
            .get(name)
            .ok_or_else(|| HarnessError::UnknownUser(name.to_string()))
    }

    /// The most recently created or logged-in user
    pub fn current_user(&self) -> HarnessResult<&TestUser> {
        let name = self.current_user.as_deref().ok_or(HarnessError::NoCurrentUser)?;
        self.user(name)
    }

    /// Create a user, filling in missing name, password and mail
    ///
    /// The user is registered for teardown, remembered with its plaintext
    /// password and becomes the current user.
    pub fn create_new_user(&mut self, draft: UserDraft) -> HarnessResult<TestUser> {
        let name = match draft.name {
            Some(name) => name,
            None => self.names.name(GENERATED_NAME_LEN),
        };
        let pass = match draft.pass {
            Some(pass) => pass,
            None => self.names.name(GENERATED_PASS_LEN),
        };
        let mail = draft.mail.unwrap_or_else(|| default_mail(&name));

        let mut user = TestUser::new(name, pass, mail);
        user.roles = draft.roles;
        user.status = draft.status;

        self.driver.create_user(&mut user)?;
        self.registry.register(user.clone());
        self.current_user = Some(user.name.clone());
        self.users.insert(user.name.clone(), user.clone());
        Ok(user)
    }

    /// Run one step against the driver
    pub fn execute(&mut self, step: &Step) -> HarnessResult<()> {
        debug!("Step: {}", step.describe());
        match step {
            Step::User {
                name,
                pass,
                mail,
                roles,
                blocked,
            } => {
                self.create_new_user(UserDraft {
                    name: name.clone(),
                    pass: pass.clone(),
                    mail: mail.clone(),
                    roles: roles.iter().cloned().collect(),
                    status: blocked.then_some(UserStatus::Blocked),
                })?;
            }
            Step::UserWithRole { role } => {
                let user = self.create_new_user(UserDraft::default())?;
                self.add_role(&user.name, role)?;
            }
            Step::UserWithPermissions { permissions } => {
                let role = self.create_role(permissions)?;
                self.create_new_user(UserDraft {
                    roles: BTreeSet::from([role.name]),
                    ..UserDraft::default()
                })?;
            }
            Step::AddRole { role, user } => {
                let target = match user {
                    Some(name) => name.clone(),
                    None => self.current_user()?.name.clone(),
                };
                self.add_role(&target, role)?;
            }
            Step::Role { permissions } => {
                self.create_role(permissions)?;
            }
            Step::Node {
                node_type,
                title,
                fields,
                published,
            } => {
                let mut node = TestNode::new(node_type.clone(), title.clone());
                node.fields = fields.clone();
                node.status = published.map(|published| {
                    if published {
                        NodeStatus::Published
                    } else {
                        NodeStatus::Unpublished
                    }
                });
                node.author = self.current_user().ok().and_then(|user| user.uid);
                self.driver.create_node(&mut node)?;
                self.registry.register(node);
            }
            Step::Term {
                vocabulary,
                name,
                description,
            } => {
                let mut term = TestTerm::new(vocabulary.clone(), name.clone());
                term.description = description.clone();
                self.driver.create_term(&mut term)?;
                self.registry.register(term);
            }
            Step::Variable { name, value, json } => {
                let value = match (json, value) {
                    (true, serde_json::Value::String(raw)) => serde_json::from_str(raw)?,
                    _ => value.clone(),
                };
                self.driver.set_variable(name, &value)?;
            }
            Step::File { path } => touch(path)?,
            Step::Login { user } => {
                let target = match user {
                    Some(name) => self.user(name)?.clone(),
                    None => self.current_user()?.clone(),
                };
                match self.driver.authenticate(&target.name, &target.pass)? {
                    Some(uid) if target.uid.map_or(true, |known| known == uid) => {
                        self.current_user = Some(target.name);
                    }
                    _ => return Err(HarnessError::LoginFailed(target.name)),
                }
            }
            Step::ClearCache => self.driver.clear_cache()?,
            Step::RunCron => {
                let report = self.driver.run_cron()?;
                debug!("Cron purged {} expired cache entries", report.expired_cache_entries);
            }
        }
        Ok(())
    }

    /// Delete everything this scenario created
    pub fn teardown(&mut self) -> HarnessResult<TeardownReport> {
        self.users.clear();
        self.current_user = None;
        Ok(self.registry.teardown(self.driver)?)
    }

    fn create_role(&mut self, permissions: &[String]) -> HarnessResult<TestRole> {
        let role = self.driver.create_role(permissions)?;
        self.registry.register(role.clone());
        Ok(role)
    }

    fn add_role(&mut self, user_name: &str, role: &str) -> HarnessResult<()> {
        let user = self
            .users
            .get_mut(user_name)
            .ok_or_else(|| HarnessError::UnknownUser(user_name.to_string()))?;
        self.driver.add_role(user, role)?;
        Ok(())
    }
}

fn touch(path: &Path) -> HarnessResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardtest_driver::BlackboxCore;

    #[test]
    fn test_default_mail() {
        assert_eq!(default_mail("alice"), "john.smithalice@example.com");
    }

    #[test]
    fn test_no_current_user() {
        let driver = BlackboxCore::new("default");
        let mut context = ScenarioContext::new(&driver);
        assert!(matches!(
            context.execute(&Step::Login { user: None }),
            Err(HarnessError::NoCurrentUser)
        ));
        assert!(matches!(
            context.execute(&Step::AddRole {
                role: "editor".into(),
                user: Some("nobody".into()),
            }),
            Err(HarnessError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_failed_create_registers_nothing() {
        let driver = BlackboxCore::new("default");
        let mut context = ScenarioContext::new(&driver);
        let err = context.create_new_user(UserDraft::default()).unwrap_err();
        assert!(matches!(err, HarnessError::Driver(_)));
        assert!(context.registry().is_empty());
        assert!(context.current_user().is_err());
    }

    #[test]
    fn test_file_step_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files/cards/art.png");
        let driver = BlackboxCore::new("default");
        let mut context = ScenarioContext::new(&driver);

        context.execute(&Step::File { path: path.clone() }).unwrap();
        context.execute(&Step::File { path: path.clone() }).unwrap();
        assert!(path.is_file());
    }
}
