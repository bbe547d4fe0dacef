use crate::error::SetupError;
use crate::language::Language;
use crate::model::{CaseResult, TestCase};

use super::Budget;

/// Trait for the per-language execution backends
///
/// A runner loads one submission, locates its entry point, and invokes it once
/// per test case. Failures that stop every case from running are returned as
/// `SetupError`; failures of a single case are recorded in its `CaseResult`
/// and the loop moves on.
pub trait SandboxRunner: Send + Sync {
    /// Language this runner executes
    fn language(&self) -> Language;

    /// Short label for log lines
    fn name(&self) -> &'static str;

    /// Runs every test case against `code`, returning results in input order
    fn run(
        &self,
        code: &str,
        cases: &[TestCase],
        budget: &Budget,
    ) -> Result<Vec<CaseResult>, SetupError>;
}
