pub mod codec;
pub mod config;
pub mod error;
pub mod harness;
pub mod language;
pub mod model;
pub mod probe;
pub mod queue;
pub mod routes;
pub mod sandbox;
pub mod web_server;
pub mod worker;

pub use error::SetupError;
pub use harness::Harness;
pub use language::Language;
pub use model::{CaseResult, ExecutionReport, TestCase};

/// Executes a submission with the default configuration
pub fn execute(code: &str, language: &str, cases: &[TestCase]) -> ExecutionReport {
    Harness::default().execute(code, language, cases)
}
