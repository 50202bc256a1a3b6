//! Scenario runner orchestrating sessions, route mocks, dialogs, and evidence

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::actions::{self, Locator};
use crate::dialogs::DialogWatcher;
use crate::error::{Error, Result};
use crate::scenario::{Scenario, Step};
use crate::session::{Session, SessionConfig};
use crate::target;

/// Result of executing one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Result of running one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running the whole suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Configuration for the scenario runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Session defaults; the per-scenario viewport overrides these
    pub session: SessionConfig,

    /// Directory holding scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Directory screenshots are written to
    pub screenshot_dir: PathBuf,

    /// Directory the JSON results file is written to
    pub output_dir: PathBuf,

    /// How long to wait for the target application to become reachable
    pub startup_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            scenarios_dir: PathBuf::from("scenarios"),
            screenshot_dir: PathBuf::from("verification"),
            output_dir: PathBuf::from("verification"),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives scenarios one at a time against fresh browser sessions.
///
/// No parallelism: one scenario runs to completion (or failure) before the
/// next begins, each owning an independent session.
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run every scenario in the scenarios directory.
    pub async fn run_all(&self) -> Result<SuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios matching a tag.
    pub async fn run_tagged(&self, tag: &str) -> Result<SuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_scenarios(&filtered).await
    }

    /// Run a specific scenario by name.
    pub async fn run_named(&self, name: &str) -> Result<SuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::ScenarioParse(format!("Scenario not found: {}", name)))?;
        self.run_scenarios(&[scenario]).await
    }

    /// Run a list of scenarios sequentially.
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> Result<SuiteResult> {
        let start = Instant::now();

        // Fail fast if the application under test is not up at all; the
        // harness never spawns it.
        target::wait_until_ready(&self.config.session.base_url, self.config.startup_timeout)
            .await?;

        info!("Running {} scenario(s)...", scenarios.len());

        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        for scenario in scenarios {
            match self.run_scenario(scenario).await {
                Ok(result) => {
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
                    results.push(result);
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {} - {}", scenario.name, e);
                    results.push(ScenarioResult {
                        name: scenario.name.clone(),
                        success: false,
                        duration_ms: 0,
                        steps: vec![],
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario against a fresh session.
    ///
    /// Teardown runs on every exit path. The first hard step failure stops
    /// the loop after a best-effort diagnostic screenshot; a dialog mismatch
    /// is recorded as a failure but later steps (evidence capture) still run.
    pub async fn run_scenario(&self, scenario: &Scenario) -> Result<ScenarioResult> {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let mut session_config = self.config.session.clone();
        session_config.viewport_width = scenario.viewport.width;
        session_config.viewport_height = scenario.viewport.height;

        let mut session = Session::launch(session_config).await?;

        let outcome = self.run_steps(&mut session, scenario).await;

        if let Err(e) = session.teardown().await {
            warn!("Session teardown failed: {}", e);
        }

        let (step_results, scenario_error) = outcome?;
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(ScenarioResult {
            name: scenario.name.clone(),
            success: scenario_error.is_none(),
            duration_ms,
            steps: step_results,
            error: scenario_error,
        })
    }

    async fn run_steps(
        &self,
        session: &mut Session,
        scenario: &Scenario,
    ) -> Result<(Vec<StepResult>, Option<String>)> {
        let route_table = scenario.route_table()?;
        if !route_table.is_empty() {
            session.install_routes(route_table).await?;
        }

        let watcher = DialogWatcher::install(session.page(), scenario.dialogs.to_policy()).await?;

        let mut step_results = Vec::new();
        let mut scenario_error: Option<String> = None;

        for step in &scenario.steps {
            let result = self.execute_step(session, &watcher, step).await;

            if !result.success {
                if scenario_error.is_none() {
                    scenario_error = result.error.clone();
                }

                // Dialog mismatches are reported, not fatal: trailing
                // evidence steps still run.
                if matches!(step, Step::ExpectDialogs { .. }) {
                    step_results.push(result);
                    continue;
                }

                step_results.push(result);
                self.capture_failure_evidence(session, &scenario.name).await;
                break;
            }

            step_results.push(result);
        }

        Ok((step_results, scenario_error))
    }

    async fn execute_step(
        &self,
        session: &Session,
        watcher: &DialogWatcher,
        step: &Step,
    ) -> StepResult {
        let start = Instant::now();
        let step_name = step.name();
        debug!("Executing step: {}", step_name);

        let mut screenshot_path = None;
        let outcome: Result<()> = match step {
            Step::Navigate { url } => session.navigate(url).await,

            Step::Fill {
                target,
                value,
                timeout_ms,
            } => {
                actions::fill(
                    session,
                    &target.to_locator(),
                    value,
                    interaction_timeout(*timeout_ms),
                )
                .await
            }

            Step::Click { target, timeout_ms } => {
                actions::click(session, &target.to_locator(), interaction_timeout(*timeout_ms))
                    .await
            }

            Step::ScrollIntoView { target } => {
                actions::scroll_into_view(session, &target.to_locator(), interaction_timeout(None))
                    .await
            }

            Step::AssertVisible { target, timeout_ms } => {
                actions::assert_visible(
                    session,
                    &target.to_locator(),
                    Duration::from_millis(*timeout_ms),
                )
                .await
            }

            Step::ExpectDialogs {
                contains,
                within_ms,
            } => {
                self.check_dialogs(watcher, contains, Duration::from_millis(*within_ms))
                    .await
            }

            Step::Screenshot {
                name,
                target,
                full_page,
            } => {
                let path = self.screenshot_path(name);
                let scope: Option<Locator> = target.as_ref().map(|t| t.to_locator());
                screenshot_path =
                    actions::capture_screenshot(session, scope.as_ref(), *full_page, &path).await;
                // Evidence capture is best-effort and never fails the run.
                Ok(())
            }

            Step::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }

            Step::Log { message } => {
                info!("[SCENARIO] {}", message);
                Ok(())
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => StepResult {
                success: true,
                step_name,
                duration_ms,
                error: None,
                screenshot_path,
            },
            Err(e) => StepResult {
                success: false,
                step_name,
                duration_ms,
                error: Some(e.to_string()),
                screenshot_path: None,
            },
        }
    }

    /// Drain the dialog log and compare it against the expected ordered
    /// substrings. Consuming the log means a later `expect_dialogs` in the
    /// same scenario only sees dialogs raised after this one.
    async fn check_dialogs(
        &self,
        watcher: &DialogWatcher,
        contains: &[String],
        within: Duration,
    ) -> Result<()> {
        watcher.wait_for(contains.len(), within).await;
        let messages: Vec<String> = watcher
            .drain()
            .into_iter()
            .map(|d| d.message)
            .collect();

        let matched = messages.len() >= contains.len()
            && contains
                .iter()
                .zip(messages.iter())
                .all(|(expected, observed)| observed.contains(expected.as_str()));

        if matched {
            Ok(())
        } else {
            Err(Error::DialogMismatch {
                expected: contains.to_vec(),
                observed: messages,
            })
        }
    }

    async fn capture_failure_evidence(&self, session: &Session, scenario_name: &str) {
        let path = self.screenshot_path(&format!("{}-failure", scenario_name));
        if actions::capture_screenshot(session, None, false, &path)
            .await
            .is_some()
        {
            info!("Failure screenshot saved to {}", path.display());
        }
    }

    fn screenshot_path(&self, name: &str) -> PathBuf {
        self.config.screenshot_dir.join(format!("{}.png", name))
    }

    /// Write suite results to a JSON file in the output directory.
    pub fn write_results(&self, results: &SuiteResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-step interaction bound, overridable per step.
fn interaction_timeout(timeout_ms: Option<u64>) -> Duration {
    Duration::from_millis(timeout_ms.unwrap_or(5000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_screenshot_paths_are_stable_across_runs() {
        let runner = Runner::with_config(RunnerConfig {
            screenshot_dir: PathBuf::from("verification"),
            ..RunnerConfig::default()
        });

        let first = runner.screenshot_path("status_empty_state");
        let second = runner.screenshot_path("status_empty_state");
        assert_eq!(first, second);
        assert_eq!(first, Path::new("verification/status_empty_state.png"));
    }

    #[test]
    fn test_write_results_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::with_config(RunnerConfig {
            output_dir: dir.path().to_path_buf(),
            ..RunnerConfig::default()
        });

        let suite = SuiteResult {
            total: 1,
            passed: 1,
            failed: 0,
            duration_ms: 42,
            results: vec![ScenarioResult {
                name: "status-empty-state".into(),
                success: true,
                duration_ms: 42,
                steps: vec![StepResult {
                    success: true,
                    step_name: "navigate:/".into(),
                    duration_ms: 40,
                    error: None,
                    screenshot_path: None,
                }],
                error: None,
            }],
        };

        let path = runner.write_results(&suite).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let parsed: SuiteResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.total, 1);
        assert_eq!(parsed.results[0].name, "status-empty-state");
    }

    #[test]
    fn test_interaction_timeout_default() {
        assert_eq!(interaction_timeout(None), Duration::from_millis(5000));
        assert_eq!(interaction_timeout(Some(250)), Duration::from_millis(250));
    }
}
