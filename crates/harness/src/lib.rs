//! CardTest scenario harness
//!
//! Scenarios are YAML files listing fixture steps. The runner builds the
//! configured driver, executes each scenario's steps through a
//! [`ScenarioContext`], tears down every fixture the scenario created and
//! collects the outcome into a [`SuiteResult`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ScenarioRunner                                          │
//! │    ├── bootstrap()            -> FixtureDriver           │
//! │    ├── run_scenario(Scenario) -> ScenarioResult          │
//! │    │     ├── ScenarioContext::execute(Step) per step     │
//! │    │     └── ScenarioContext::teardown()                 │
//! │    └── write_results(SuiteResult)                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                         │
//! │    ├── name, description, tags                           │
//! │    └── steps: user | user_with_role | role | node | ...  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod runner;
pub mod scenario;

pub use config::HarnessConfig;
pub use context::{default_mail, ScenarioContext, UserDraft};
pub use error::{HarnessError, HarnessResult};
pub use runner::{ScenarioResult, ScenarioRunner, StepResult, SuiteResult};
pub use scenario::{Scenario, Step};
