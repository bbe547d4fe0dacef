use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{self, ParsedValue};
use crate::error::SetupError;

fn default_kind() -> String {
    "normal".to_string()
}

/// One input/output fixture supplied by the caller
///
/// Both strings are kept exactly as received; decoding happens in the codec
/// every time an executor needs structured values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    #[serde(alias = "output", alias = "expected_output")]
    pub expected_output: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            kind: default_kind(),
            explanation: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

/// Verdict and diagnostics for one test case
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    /// 1-based position of the case in the submitted list
    pub index: usize,
    pub input: String,
    pub expected_output: String,
    pub actual_output: Option<String>,
    pub passed: bool,
    pub error: Option<String>,
    /// Text printed by the submission while this case ran, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

impl CaseResult {
    /// Builds the result of a case whose entry point returned `actual`
    pub fn evaluated(index: usize, case: &TestCase, actual: &Value) -> Self {
        let expected = ParsedValue::parse(&case.expected_output);
        Self {
            index,
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: Some(codec::render(actual)),
            passed: codec::equivalent(actual, &expected),
            error: None,
            stdout: None,
        }
    }

    /// Builds the result of a case whose invocation raised an error
    pub fn errored(index: usize, case: &TestCase, message: impl Into<String>) -> Self {
        Self {
            index,
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: None,
            passed: false,
            error: Some(message.into()),
            stdout: None,
        }
    }

    pub fn with_stdout(mut self, stdout: String) -> Self {
        if !stdout.is_empty() {
            self.stdout = Some(stdout);
        }
        self
    }
}

/// The only shape handed back to callers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub success: bool,
    pub cases_passed: usize,
    pub cases_total: usize,
    pub cases: Vec<CaseResult>,
    pub setup_error: Option<String>,
}

impl ExecutionReport {
    /// A report for a submission that never reached the per-case loop
    pub fn setup_failure(cases_total: usize, error: &SetupError) -> Self {
        Self {
            success: false,
            cases_passed: 0,
            cases_total,
            cases: Vec::new(),
            setup_error: Some(error.to_string()),
        }
    }

    /// Aggregates per-case results, keeping their order
    pub fn from_cases(cases: Vec<CaseResult>) -> Self {
        let cases_passed = cases.iter().filter(|c| c.passed).count();
        let cases_total = cases.len();
        Self {
            success: cases_total > 0 && cases_passed == cases_total,
            cases_passed,
            cases_total,
            cases,
            setup_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_case_accepts_legacy_output_key() {
        let case: TestCase = serde_json::from_value(json!({
            "input": "[1, 2]",
            "output": "3"
        }))
        .unwrap();
        assert_eq!(case.expected_output, "3");
        assert_eq!(case.kind, "normal");
        assert_eq!(case.explanation, None);
    }

    #[test]
    fn test_report_aggregation() {
        let case = TestCase::new("[2, 3]", "5");
        let report = ExecutionReport::from_cases(vec![
            CaseResult::evaluated(1, &case, &json!(5)),
            CaseResult::evaluated(2, &case, &json!(6)),
            CaseResult::errored(3, &case, "boom"),
        ]);

        assert_eq!(report.cases_passed, 1);
        assert_eq!(report.cases_total, 3);
        assert!(!report.success);
        assert_eq!(report.cases[1].error, None);
        assert_eq!(report.cases[1].actual_output.as_deref(), Some("6"));
        assert_eq!(report.cases[2].actual_output, None);
    }

    #[test]
    fn test_setup_failure_has_no_cases() {
        let report = ExecutionReport::setup_failure(4, &SetupError::NoTestCases);
        assert_eq!(report.cases_total, 4);
        assert_eq!(report.cases_passed, 0);
        assert!(report.cases.is_empty());
        assert!(!report.success);
        assert_eq!(report.setup_error.as_deref(), Some("no test cases supplied"));
    }

    #[test]
    fn test_report_wire_shape() {
        let report = ExecutionReport::from_cases(vec![CaseResult::evaluated(
            1,
            &TestCase::new("1", "1"),
            &json!(1),
        )]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["casesPassed"], json!(1));
        assert_eq!(value["setupError"], Value::Null);
        assert_eq!(value["cases"][0]["expectedOutput"], json!("1"));
        assert!(value["cases"][0].get("stdout").is_none());
    }
}
