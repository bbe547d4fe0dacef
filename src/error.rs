//! Failure taxonomy for the execution core.

use std::time::Duration;

use thiserror::Error;

use crate::language::Language;

/// A failure that prevents any test case from running
///
/// Rendered verbatim into `ExecutionReport::setup_error`, so every message is
/// written to be shown to the submitting user.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unsupported language: '{token}' (supported: {supported})")]
    UnsupportedLanguage { token: String, supported: String },

    #[error("no test cases supplied")]
    NoTestCases,

    #[error("{toolchain} is not available: {reason}. {hint}")]
    MissingToolchain {
        toolchain: String,
        reason: String,
        hint: String,
    },

    #[error("{0} submissions cannot be executed yet; use Rhai, Python or JavaScript")]
    NotYetExecutable(Language),

    #[error("no entry point found: {0}")]
    MissingEntryPoint(String),

    #[error("restricted code check failed: {0}")]
    RestrictedCode(String),

    #[error("code failed to load: {0}")]
    Load(String),

    #[error("execution time limit exceeded ({}ms)", .0.as_millis())]
    TimeLimit(Duration),

    /// Failure reported by the generated harness itself, shown as-is
    #[error("{0}")]
    Harness(String),

    /// Process died before reporting; carries the truncated stderr
    #[error("{0}")]
    Runtime(String),

    #[error("malformed harness output: {0}")]
    MalformedOutput(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<std::io::Error> for SetupError {
    fn from(e: std::io::Error) -> Self {
        Self::Infrastructure(e.to_string())
    }
}

/// Outcome of a failed toolchain probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("'{0}' was not found on PATH")]
    NotFound(String),

    #[error("'{binary}' did not answer within {}ms", .timeout.as_millis())]
    Timeout { binary: String, timeout: Duration },

    #[error("'{binary}' exited with {status}")]
    Unresponsive { binary: String, status: String },

    #[error("probe failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_lead_with_condition() {
        let timeout = SetupError::TimeLimit(Duration::from_secs(1));
        assert_eq!(timeout.to_string(), "execution time limit exceeded (1000ms)");

        let restricted = SetupError::RestrictedCode("call to 'eval' is not permitted".into());
        assert!(restricted.to_string().starts_with("restricted code check failed"));

        let unsupported = SetupError::UnsupportedLanguage {
            token: "cobol".into(),
            supported: "rhai".into(),
        };
        assert!(unsupported.to_string().starts_with("unsupported language"));
    }
}
