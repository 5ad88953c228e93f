//! Scenario runner: bootstraps the driver, executes steps, tears down fixtures

use cardtest_common::DriverError;
use cardtest_driver::{build_driver, FixtureDriver};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::context::ScenarioContext;
use crate::error::{HarnessError, HarnessResult};
use crate::scenario::Scenario;

/// Outcome of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    /// Fixtures deleted at teardown
    pub fixtures_removed: usize,
    /// Set when one or more fixtures could not be deleted
    pub teardown_error: Option<String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub teardown_failures: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs scenarios against one driver
pub struct ScenarioRunner {
    driver: Box<dyn FixtureDriver>,
    config: HarnessConfig,
}

impl ScenarioRunner {
    /// Create a runner with the driver selected by the configuration
    pub fn new(config: HarnessConfig) -> Self {
        let driver = build_driver(&config.backend);
        Self::with_driver(config, driver)
    }

    /// Create a runner around an already constructed driver
    pub fn with_driver(config: HarnessConfig, driver: Box<dyn FixtureDriver>) -> Self {
        Self { driver, config }
    }

    pub fn driver(&self) -> &dyn FixtureDriver {
        self.driver.as_ref()
    }

    /// Bootstrap the backend; repeated calls are no-ops
    pub fn bootstrap(&mut self) -> HarnessResult<()> {
        self.driver.bootstrap()?;
        Ok(())
    }

    /// Run all scenarios in the scenarios directory
    pub fn run_all(&mut self) -> HarnessResult<SuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        self.run_scenarios(&scenarios)
    }

    /// Run scenarios matching a tag
    pub fn run_tagged(&mut self, tag: &str) -> HarnessResult<SuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_scenarios(&filtered)
    }

    /// Run a specific scenario by name
    pub fn run_named(&mut self, name: &str) -> HarnessResult<ScenarioResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| HarnessError::SpecParse(format!("Scenario not found: {}", name)))?;

        self.bootstrap()?;
        Ok(self.run_scenario(&scenario))
    }

    /// Run a list of scenarios
    pub fn run_scenarios(&mut self, scenarios: &[Scenario]) -> HarnessResult<SuiteResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let mut teardown_failures = 0;

        self.bootstrap()?;

        info!(
            "Running {} scenario(s) with the {} driver",
            scenarios.len(),
            self.driver.name()
        );

        for scenario in scenarios {
            let result = self.run_scenario(scenario);
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            if result.teardown_error.is_some() {
                teardown_failures += 1;
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Scenario results: {} passed, {} failed, {} teardown failure(s) ({} ms)",
            passed, failed, teardown_failures, duration_ms
        );

        Ok(SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            teardown_failures,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario
    ///
    /// Steps run in order until one fails. Teardown always runs afterwards;
    /// a teardown failure is recorded but leaves the verdict untouched.
    pub fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let mut context = ScenarioContext::new(self.driver.as_ref());
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut failure = None;

        for step in &scenario.steps {
            let description = step.describe();
            match context.execute(step) {
                Ok(()) => steps.push(StepResult {
                    step: description,
                    success: true,
                    error: None,
                }),
                Err(e) => {
                    steps.push(StepResult {
                        step: description.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                    failure = Some(HarnessError::StepFailed {
                        step: description,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        let (fixtures_removed, teardown_error) = match context.teardown() {
            Ok(report) => (report.deleted, None),
            Err(e) => {
                warn!("Teardown of {} incomplete: {}", scenario.name, e);
                let deleted = match &e {
                    HarnessError::Driver(DriverError::Teardown(aggregate)) => aggregate.deleted,
                    _ => 0,
                };
                (deleted, Some(e.to_string()))
            }
        };

        ScenarioResult {
            name: scenario.name.clone(),
            success: failure.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error: failure.map(|e| e.to_string()),
            fixtures_removed,
            teardown_error,
        }
    }

    /// Write results to the configured output directory
    pub fn write_results(&self, results: &SuiteResult) -> HarnessResult<()> {
        write_results(results, &self.config.results_path())
    }
}

/// Write results as pretty JSON, creating parent directories
pub fn write_results(results: &SuiteResult, path: &Path) -> HarnessResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    info!("Results written to {}", path.display());
    Ok(())
}
