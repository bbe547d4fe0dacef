use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::config::HarnessConfig;
use crate::error::SetupError;
use crate::language::Language;
use crate::model::{CaseResult, ExecutionReport, TestCase};
use crate::probe;
use crate::sandbox::{self, Budget, block_on, create_sandbox_runner};

/// Entry point of the execution core
///
/// Resolves the language, checks its toolchain, hands the submission to the
/// matching runner, and folds every outcome into an `ExecutionReport`. It never
/// returns an error or panics: every failure becomes a report. Holds no
/// per-call state, so one instance can serve any number of threads at once.
#[derive(Debug, Clone, Default)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs `code` against every case and reports per-case verdicts
    ///
    /// Blocks the calling thread. From async code, call it through
    /// `tokio::task::spawn_blocking`.
    pub fn execute(&self, code: &str, language: &str, cases: &[TestCase]) -> ExecutionReport {
        self.execute_with_deadline(code, language, cases, None)
    }

    /// Like [`Harness::execute`], with the budget shrunk to fit before `deadline`
    pub fn execute_with_deadline(
        &self,
        code: &str,
        language: &str,
        cases: &[TestCase],
        deadline: Option<Instant>,
    ) -> ExecutionReport {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dispatch(code, language, cases, deadline)
        }))
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "executor panicked".to_string());
            log::error!("Execution panicked: {message}");
            Err(SetupError::Infrastructure(message))
        });

        match outcome {
            Ok(results) => {
                let report = ExecutionReport::from_cases(results);
                log::info!(
                    "Executed {language} submission: {}/{} cases passed in {}ms",
                    report.cases_passed,
                    report.cases_total,
                    started.elapsed().as_millis()
                );
                report
            }
            Err(error) => {
                match &error {
                    SetupError::Infrastructure(_) => {
                        log::error!("Execution of {language} submission failed: {error}")
                    }
                    _ => log::warn!("Execution of {language} submission failed: {error}"),
                }
                ExecutionReport::setup_failure(cases.len(), &error)
            }
        }
    }

    fn dispatch(
        &self,
        code: &str,
        token: &str,
        cases: &[TestCase],
        deadline: Option<Instant>,
    ) -> Result<Vec<CaseResult>, SetupError> {
        let language = Language::resolve(token).ok_or_else(|| SetupError::UnsupportedLanguage {
            token: token.to_string(),
            supported: Language::supported_list(),
        })?;

        if cases.is_empty() {
            return Err(SetupError::NoTestCases);
        }

        let limits = &self.config.limits;
        let budget = match deadline {
            Some(deadline) => {
                Budget::until(limits, deadline).ok_or(SetupError::TimeLimit(Duration::ZERO))?
            }
            None => Budget::from_limits(limits),
        };

        if let Some(toolchain) = language.toolchain() {
            let version = block_on(probe::probe(&toolchain, budget.probe))?
                .map_err(|e| probe::setup_error(&toolchain, e))?;
            log::debug!("Found {} ({version})", toolchain.name);
        }

        let runner = create_sandbox_runner(language, self.config.isolation)
            .ok_or(SetupError::NotYetExecutable(language))?;
        log::debug!(
            "Running {} cases with {} ({}ms budget)",
            cases.len(),
            runner.name(),
            budget.run.as_millis()
        );

        let code = sandbox::sanitize_source(code);
        runner.run(&code, cases, &budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase::new(input, expected)
    }

    #[test]
    fn test_unsupported_language_is_checked_first() {
        let report = Harness::default().execute("", "cobol", &[]);
        assert_eq!(report.cases_total, 0);
        assert!(
            report
                .setup_error
                .as_deref()
                .unwrap()
                .starts_with("unsupported language: 'cobol'")
        );
    }

    #[test]
    fn test_empty_cases() {
        let report = Harness::default().execute("fn solution() { 1 }", "rhai", &[]);
        assert_eq!(report.setup_error.as_deref(), Some("no test cases supplied"));
        assert!(!report.success);
    }

    #[test]
    fn test_sanitizes_before_running() {
        let code = "fn solution(s) { s + \u{201C}!\u{201D} }";
        let report = Harness::default().execute(code, "RHAI", &[case("\"hi\"", "hi!")]);
        assert!(report.success, "{report:?}");
    }

    #[test]
    fn test_expired_deadline() {
        let report = Harness::default().execute_with_deadline(
            "fn solution() { 1 }",
            "rhai",
            &[case("[]", "1")],
            Some(Instant::now()),
        );
        assert!(
            report
                .setup_error
                .as_deref()
                .unwrap()
                .starts_with("execution time limit exceeded")
        );
        assert_eq!(report.cases_total, 1);
    }
}
