//! End-to-end scenario runs against a temporary site

use cardtest_common::{
    CronReport, DriverError, Result as DriverResult, RoleId, Site, TestNode, TestRole, TestTerm,
    TestUser, UserId,
};
use cardtest_driver::{CoreVersion, CurrentCore, DriverSettings, FixtureDriver, RequestContext};
use std::path::PathBuf;
use cardtest_harness::{
    HarnessConfig, HarnessError, Scenario, ScenarioContext, ScenarioRunner, Step, UserDraft,
};
use tempfile::TempDir;
use test_case::test_case;

struct Fixture {
    dir: TempDir,
    site: Site,
}

impl Fixture {
    fn install() -> Self {
        let dir = tempfile::tempdir().expect("create temp root");
        let site = Site::install(dir.path(), "default").expect("install site");
        site.create_vocabulary("Card sets").expect("create vocabulary");
        site.create_named_role("editor").expect("create role");
        Self { dir, site }
    }

    fn config(&self, core: CoreVersion) -> HarnessConfig {
        HarnessConfig {
            backend: DriverSettings {
                root: self.dir.path().to_path_buf(),
                uri: "default".into(),
                core,
            },
            scenarios_dir: self.dir.path().join("scenarios"),
            output_dir: self.dir.path().join("results"),
        }
    }

    fn driver(&self) -> CurrentCore {
        let mut driver = CurrentCore::new(self.dir.path(), "default");
        driver.bootstrap().expect("bootstrap");
        driver
    }

    fn count(&self, table: &str) -> i64 {
        self.site.db().count(table).expect("count rows")
    }
}

const CARD_ART: &str = r#"
name: card-art-submission
tags: [cardlike]
steps:
  - action: user_with_permissions
    permissions:
      - access content
      - create card_art content
  - action: login
  - action: node
    type: card_art
    title: Red Dragon
    fields:
      artist: Kim
  - action: term
    vocabulary: Card sets
    name: Alpha
  - action: add_role
    role: editor
  - action: variable
    name: card_voting
    value: '{"enabled": true}'
    json: true
  - action: clear_cache
  - action: run_cron
"#;

#[test]
fn test_scenario_leaves_no_fixtures_behind() {
    let fixture = Fixture::install();
    let users = fixture.count("users");
    let roles = fixture.count("role");

    let mut runner = ScenarioRunner::new(fixture.config(CoreVersion::Current));
    runner.bootstrap().unwrap();
    let result = runner.run_scenario(&Scenario::from_yaml(CARD_ART).unwrap());

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.steps.len(), 8);
    // role, user, node, term
    assert_eq!(result.fixtures_removed, 4);
    assert_eq!(result.teardown_error, None);

    assert_eq!(fixture.count("users"), users);
    assert_eq!(fixture.count("role"), roles);
    assert_eq!(fixture.count("node"), 0);
    assert_eq!(fixture.count("term_data"), 0);
    assert_eq!(
        fixture.site.db().variable_get("card_voting").unwrap(),
        Some(serde_json::json!({"enabled": true}))
    );
}

#[test]
fn test_generated_mail_follows_name() {
    let fixture = Fixture::install();
    let driver = fixture.driver();
    let mut context = ScenarioContext::new(&driver);

    let alice = context
        .create_new_user(UserDraft {
            name: Some("alice".into()),
            ..UserDraft::default()
        })
        .unwrap();
    assert_eq!(alice.mail, "john.smithalice@example.com");
    assert_eq!(alice.pass.len(), 16);

    let generated = context.create_new_user(UserDraft::default()).unwrap();
    assert_eq!(generated.name.len(), 8);
    assert_eq!(generated.mail, format!("john.smith{}@example.com", generated.name));
    assert_eq!(context.current_user().unwrap().name, generated.name);

    context.execute(&Step::Login { user: Some("alice".into()) }).unwrap();
    assert_eq!(context.current_user().unwrap().name, "alice");

    context.teardown().unwrap();
}

#[test]
fn test_teardown_continues_past_missing_fixture() {
    let fixture = Fixture::install();
    let users = fixture.count("users");
    let roles = fixture.count("role");
    let driver = fixture.driver();
    let mut context = ScenarioContext::new(&driver);

    context.execute(&Step::Role { permissions: vec!["access content".into()] }).unwrap();
    context
        .execute(&Step::Node {
            node_type: "card_art".into(),
            title: "Gone early".into(),
            fields: Default::default(),
            published: Some(false),
        })
        .unwrap();
    context
        .execute(&Step::User {
            name: Some("carol".into()),
            pass: None,
            mail: None,
            roles: vec![],
            blocked: false,
        })
        .unwrap();

    let node = context.registry().entries()[1].fixture.clone();
    let nid = match node {
        cardtest_common::Fixture::Node(node) => node.nid.unwrap(),
        other => panic!("unexpected fixture {:?}", other),
    };
    assert!(fixture.site.delete_node(nid).unwrap());

    let err = context.teardown().unwrap_err();
    match err {
        HarnessError::Driver(DriverError::Teardown(aggregate)) => {
            assert_eq!(aggregate.failures.len(), 1);
            assert_eq!(aggregate.failures[0].id, nid.to_string());
            assert_eq!(aggregate.deleted, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(context.registry().is_empty());
    assert_eq!(fixture.count("node"), 0);
    assert_eq!(fixture.count("users"), users);
    assert_eq!(fixture.count("role"), roles);
}

#[test_case(CoreVersion::Legacy ; "legacy core")]
#[test_case(CoreVersion::Blackbox ; "blackbox")]
fn test_term_step_unsupported(core: CoreVersion) {
    let fixture = Fixture::install();
    let mut runner = ScenarioRunner::new(fixture.config(core));
    runner.bootstrap().unwrap();

    let scenario = Scenario::from_yaml(
        r#"
name: terms
steps:
  - action: term
    vocabulary: Card sets
    name: Alpha
"#,
    )
    .unwrap();
    let result = runner.run_scenario(&scenario);
    assert!(!result.success);
    assert!(result.error.unwrap().contains("No ability to create terms"));
    assert_eq!(fixture.count("term_data"), 0);
}

#[test]
fn test_run_all_writes_results() {
    let fixture = Fixture::install();
    let config = fixture.config(CoreVersion::Current);
    std::fs::create_dir_all(&config.scenarios_dir).unwrap();
    std::fs::write(config.scenarios_dir.join("card_art.yaml"), CARD_ART).unwrap();
    std::fs::write(
        config.scenarios_dir.join("unknown_role.yaml"),
        "name: unknown-role\nsteps:\n  - action: user_with_role\n    role: moderator\n",
    )
    .unwrap();
    let results_path = config.results_path();

    let mut runner = ScenarioRunner::new(config);
    let suite = runner.run_all().unwrap();
    assert_eq!(suite.total, 2);
    assert_eq!(suite.passed, 1);
    assert_eq!(suite.failed, 1);
    assert_eq!(suite.teardown_failures, 0);

    let failed = &suite.results[1];
    assert_eq!(failed.name, "unknown-role");
    assert!(failed.error.as_deref().unwrap().contains("moderator"));
    // the user created before the failing role grant is still cleaned up
    assert_eq!(failed.fixtures_removed, 1);

    runner.write_results(&suite).unwrap();
    assert!(results_path.is_file());

    let tagged = runner.run_tagged("cardlike").unwrap();
    assert_eq!(tagged.total, 1);
    assert!(tagged.all_passed());
}

/// Current core whose node deletions always fail
struct StuckNodes(CurrentCore);

impl FixtureDriver for StuckNodes {
    fn name(&self) -> &'static str {
        "stuck nodes"
    }

    fn bootstrap(&mut self) -> DriverResult<()> {
        self.0.bootstrap()
    }

    fn request_context(&self) -> Option<&RequestContext> {
        self.0.request_context()
    }

    fn create_user(&self, user: &mut TestUser) -> DriverResult<()> {
        self.0.create_user(user)
    }

    fn delete_user(&self, user: &TestUser) -> DriverResult<()> {
        self.0.delete_user(user)
    }

    fn add_role(&self, user: &mut TestUser, role_name: &str) -> DriverResult<()> {
        self.0.add_role(user, role_name)
    }

    fn authenticate(&self, name: &str, pass: &str) -> DriverResult<Option<UserId>> {
        self.0.authenticate(name, pass)
    }

    fn create_node(&self, node: &mut TestNode) -> DriverResult<()> {
        self.0.create_node(node)
    }

    fn delete_node(&self, _node: &TestNode) -> DriverResult<()> {
        Err(DriverError::Backend("node table locked".into()))
    }

    fn create_term(&self, term: &mut TestTerm) -> DriverResult<()> {
        self.0.create_term(term)
    }

    fn delete_term(&self, term: &TestTerm) -> DriverResult<()> {
        self.0.delete_term(term)
    }

    fn create_role(&self, permissions: &[String]) -> DriverResult<TestRole> {
        self.0.create_role(permissions)
    }

    fn delete_role(&self, rid: RoleId) -> DriverResult<()> {
        self.0.delete_role(rid)
    }

    fn clear_cache(&self) -> DriverResult<()> {
        self.0.clear_cache()
    }

    fn run_cron(&self) -> DriverResult<CronReport> {
        self.0.run_cron()
    }

    fn set_variable(&self, name: &str, value: &serde_json::Value) -> DriverResult<()> {
        self.0.set_variable(name, value)
    }

    fn variable(&self, name: &str) -> DriverResult<Option<serde_json::Value>> {
        self.0.variable(name)
    }

    fn extension_paths(&self) -> DriverResult<Vec<PathBuf>> {
        self.0.extension_paths()
    }

    fn exists(&self, fixture: &cardtest_common::Fixture) -> DriverResult<bool> {
        self.0.exists(fixture)
    }
}

#[test]
fn test_partial_teardown_reports_deleted_fixtures() {
    let fixture = Fixture::install();
    let users = fixture.count("users");
    let roles = fixture.count("role");
    let driver = StuckNodes(CurrentCore::new(fixture.dir.path(), "default"));
    let mut runner =
        ScenarioRunner::with_driver(fixture.config(CoreVersion::Current), Box::new(driver));
    runner.bootstrap().unwrap();

    let scenario = Scenario::from_yaml(
        r#"
name: stuck-node
steps:
  - action: user_with_permissions
    permissions: [access content]
  - action: node
    type: card_art
    title: Stuck
"#,
    )
    .unwrap();
    let result = runner.run_scenario(&scenario);

    assert!(result.success, "{:?}", result.error);
    // role and user go, the node stays
    assert_eq!(result.fixtures_removed, 2);
    assert!(result.teardown_error.unwrap().contains("node table locked"));
    assert_eq!(fixture.count("users"), users);
    assert_eq!(fixture.count("role"), roles);
    assert_eq!(fixture.count("node"), 1);
}
