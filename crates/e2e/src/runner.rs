//! Test runner that executes suites case by case, each on a fresh page

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::driver::DriverFactory;
use crate::error::{E2eError, E2eResult};
use crate::scope::Scope;
use crate::session::SessionController;
use crate::spec::{TestCase, TestStep, TestSuite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

impl TestResult {
    fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: TestStatus::Skipped,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
        }
    }
}

/// Result of running one suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub backend: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub suites: Vec<TestSuiteResult>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    controller: SessionController,
    backend: String,
    filter: Option<String>,
}

impl TestRunner {
    pub fn new(factory: Arc<dyn DriverFactory>, config: HarnessConfig, backend: &str) -> E2eResult<Self> {
        Ok(Self {
            controller: SessionController::new(factory, config)?,
            backend: backend.to_string(),
            filter: None,
        })
    }

    /// Only run test cases whose name contains `filter`
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        self.controller.config()
    }

    /// Run suites strictly one test case at a time
    pub async fn run_all(&self, suites: &[TestSuite]) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut aborted = false;
        let mut results = Vec::new();

        for suite in suites {
            let result = self.run_suite(suite, &mut aborted).await;
            results.push(result);
        }

        let report = RunReport {
            started_at,
            backend: self.backend.clone(),
            total: results.iter().map(|r| r.total).sum(),
            passed: results.iter().map(|r| r.passed).sum(),
            failed: results.iter().map(|r| r.failed).sum(),
            skipped: results.iter().map(|r| r.skipped).sum(),
            duration_ms: start.elapsed().as_millis() as u64,
            suites: results,
        };

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            report.passed, report.failed, report.skipped, report.duration_ms
        );
        report
    }

    /// Run one suite. Once `aborted` is set (fail-fast), remaining cases
    /// are recorded as skipped.
    pub async fn run_suite(&self, suite: &TestSuite, aborted: &mut bool) -> TestSuiteResult {
        let start = Instant::now();
        let cases: Vec<&TestCase> = suite
            .tests
            .iter()
            .filter(|c| self.filter.as_deref().map_or(true, |f| c.name.contains(f)))
            .collect();

        info!("Running suite {} ({} test(s))...", suite.name, cases.len());

        let mut results = Vec::new();
        for case in cases {
            if *aborted {
                results.push(TestResult::skipped(&case.name));
                continue;
            }

            let result = self.run_case(suite, case).await;
            match result.status {
                TestStatus::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
                _ => {
                    error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
                    if self.config().fail_fast {
                        warn!("Fail-fast: skipping remaining tests");
                        *aborted = true;
                    }
                }
            }
            results.push(result);
        }

        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();
        let (passed, failed, skipped) = (
            count(TestStatus::Passed),
            count(TestStatus::Failed),
            count(TestStatus::Skipped),
        );
        TestSuiteResult {
            suite: suite.name.clone(),
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        }
    }

    /// Run a single test case on its own freshly loaded page
    pub async fn run_case(&self, suite: &TestSuite, case: &TestCase) -> TestResult {
        let start = Instant::now();
        debug!("Running test: {}", case.name);

        let mut steps = Vec::new();
        let outcome = match self.config().resolve_url(&suite.visit) {
            Ok(url) => match self.controller.begin(&url).await {
                Ok(page) => {
                    let outcome = run_steps(&page.root(), &case.steps, "", &mut steps).await;
                    if let Err(e) = page.close().await {
                        warn!("Failed to close page for {}: {}", case.name, e);
                    }
                    outcome
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let (status, error) = match outcome {
            Ok(()) => (TestStatus::Passed, None),
            Err(e) => (TestStatus::Failed, Some(e.to_string())),
        };

        TestResult {
            name: case.name.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error,
        }
    }

    /// Write the report to `<output_dir>/test-results.json`
    pub fn write_results(&self, report: &RunReport) -> E2eResult<PathBuf> {
        let output_dir = &self.config().output_dir;
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Execute steps in order, stopping at the first failure
fn run_steps<'a>(
    scope: &'a Scope<'a>,
    steps: &'a [TestStep],
    prefix: &'a str,
    results: &'a mut Vec<StepResult>,
) -> BoxFuture<'a, E2eResult<()>> {
    async move {
        for step in steps {
            let name = format!("{}{}", prefix, step.name());

            if let TestStep::Within { selector, steps: nested } = step {
                let inner = match scope.within(selector) {
                    Ok(inner) => inner,
                    Err(e) => {
                        results.push(StepResult {
                            step: name,
                            success: false,
                            duration_ms: 0,
                            error: Some(e.to_string()),
                        });
                        return Err(e);
                    }
                };
                let nested_prefix = format!("{} > ", name);
                run_steps(&inner, nested, &nested_prefix, results).await?;
                continue;
            }

            let start = Instant::now();
            let outcome = run_step(scope, step).await;
            let success = outcome.is_ok();
            results.push(StepResult {
                step: name,
                success,
                duration_ms: start.elapsed().as_millis() as u64,
                error: outcome.as_ref().err().map(E2eError::to_string),
            });
            outcome?;
        }
        Ok(())
    }
    .boxed()
}

async fn run_step(scope: &Scope<'_>, step: &TestStep) -> E2eResult<()> {
    match step {
        TestStep::Assert { selector, .. } => {
            let mut query = scope.get(selector)?;
            if let Some(timeout) = step.timeout() {
                query = query.timeout(timeout);
            }
            for predicate in step.predicates() {
                query.should(predicate).await?;
            }
            Ok(())
        }
        TestStep::Click { selector, .. } => {
            let mut query = scope.get(selector)?;
            if let Some(timeout) = step.timeout() {
                query = query.timeout(timeout);
            }
            query.click().await
        }
        TestStep::Log { message } => {
            info!("[TEST LOG] {}", message);
            Ok(())
        }
        TestStep::Within { .. } => Err(E2eError::SpecParse(
            "within steps are expanded by the runner".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;

    const BASE: &str = "http://shop.test/";

    fn runner(fail_fast: bool, output_dir: PathBuf) -> TestRunner {
        let config = HarnessConfig {
            base_url: BASE.to_string(),
            fail_fast,
            output_dir,
            ..Default::default()
        };
        TestRunner::new(Arc::new(fixture::storefront(BASE)), config, "memory").unwrap()
    }

    fn suite(yaml: &str) -> TestSuite {
        TestSuite::from_yaml(yaml).unwrap()
    }

    const MIXED: &str = r#"
name: mixed
tests:
  - name: passes
    steps:
      - action: assert
        selector: '[data-testid="product-link"]'
        length: 20
  - name: fails
    steps:
      - action: assert
        selector: '[data-testid="product-link"]'
        length: 21
        timeout_ms: 100
      - action: log
        message: never reached
  - name: passes again
    steps:
      - action: within
        selector: '[data-testid="categories-list"]'
        steps:
          - action: assert
            selector: '[data-selected="true"]'
            exists: false
"#;

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_local_to_its_case() {
        let dir = tempfile::tempdir().unwrap();
        let report = runner(false, dir.path().to_path_buf()).run_all(&[suite(MIXED)]).await;

        assert_eq!((report.passed, report.failed, report.skipped), (2, 1, 0));
        let failed = &report.suites[0].results[1];
        assert_eq!(failed.status, TestStatus::Failed);
        // Aborted at the failing step; the log step never ran
        assert_eq!(failed.steps.len(), 1);
        let message = failed.error.as_deref().unwrap();
        assert!(message.contains("have length 21"), "{message}");
        assert!(message.contains("20 elements"), "{message}");

        let nested = &report.suites[0].results[2].steps[0];
        assert_eq!(
            nested.step,
            r#"within:[data-testid="categories-list"] > assert:[data-selected="true"]"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_within_selector_is_recorded() {
        let yaml = r#"
name: scoping
tests:
  - name: scopes by class
    steps:
      - action: within
        selector: 'ul.categories'
        steps:
          - action: log
            message: never reached
"#;
        let dir = tempfile::tempdir().unwrap();
        let report = runner(false, dir.path().to_path_buf()).run_all(&[suite(yaml)]).await;

        let result = &report.suites[0].results[0];
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.steps.len(), 1);
        let step = &result.steps[0];
        assert_eq!(step.step, "within:ul.categories");
        assert!(!step.success);
        assert_eq!(step.error, result.error);
        assert!(step.error.as_deref().unwrap().contains("data-* attribute"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let report = runner(true, dir.path().to_path_buf())
            .run_all(&[suite(MIXED), suite(&MIXED.replace("name: mixed", "name: later"))])
            .await;

        assert_eq!((report.passed, report.failed, report.skipped), (1, 1, 4));
        assert_eq!(report.suites[1].skipped, 3);
        assert!(!report.success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_selects_cases() {
        let dir = tempfile::tempdir().unwrap();
        let report = runner(false, dir.path().to_path_buf())
            .with_filter(Some("again".to_string()))
            .run_all(&[suite(MIXED)])
            .await;
        assert_eq!(report.total, 1);
        assert!(report.success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_visit_fails_before_steps() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = MIXED.replace("name: mixed", "name: offline\nvisit: http://offline.test/");
        let report = runner(false, dir.path().to_path_buf()).run_all(&[suite(&yaml)]).await;

        assert_eq!(report.failed, 3);
        for result in &report.suites[0].results {
            assert!(result.steps.is_empty());
            assert!(result.error.as_deref().unwrap().contains("Navigation"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(false, dir.path().join("out"));
        let report = runner.run_all(&[suite(MIXED)]).await;

        let path = runner.write_results(&report).unwrap();
        let written: RunReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written.total, 3);
        assert_eq!(written.backend, "memory");
        assert_eq!(written.suites[0].results[1].status, TestStatus::Failed);
    }
}
