use serde_json::json;

use crate::error::SetupError;
use crate::language::Language;
use crate::model::TestCase;

/// Prefix of the single stdout line carrying the harness's JSON payload
pub(super) const RESULT_MARKER: &str = "__HARNESS_RESULT__ ";

/// Names a subprocess submission may give its entry point, in lookup order
pub(super) const ENTRY_NAMES: [&str; 3] = ["solution", "solve", "solucion"];

const PYTHON_RUNNER: &str = r#"

# ---- test runner ----
import ast as _h_ast
import json as _h_json
import sys as _h_sys

_H_CASES = _h_json.loads(@@CASES@@)
_H_ENTRY_NAMES = @@ENTRY_NAMES@@


def _h_decode(text):
    try:
        return _h_json.loads(text)
    except Exception:
        pass
    try:
        return _h_ast.literal_eval(text)
    except Exception:
        return text


def _h_encode(value):
    if isinstance(value, (set, frozenset)):
        return sorted(value, key=repr)
    return repr(value)


def _h_emit(payload):
    text = _h_json.dumps(payload, default=_h_encode, allow_nan=False)
    _h_sys.stdout.write("\n@@MARKER@@" + text + "\n")
    _h_sys.stdout.flush()


def _h_check_encodable(record):
    try:
        _h_json.dumps(record["actual"], default=_h_encode, allow_nan=False)
    except (ValueError, TypeError, RecursionError) as exc:
        record["actual"] = None
        record["error"] = "%s: return value is not JSON compatible (%s)" % (type(exc).__name__, exc)


def _h_main():
    namespace = globals()
    entry = next(
        (namespace[name] for name in _H_ENTRY_NAMES if callable(namespace.get(name))),
        None,
    )
    if entry is None:
        _h_emit({"harness_error": "no entry point found: @@GUIDANCE@@"})
        return 3
    results = []
    for index, case in enumerate(_H_CASES, start=1):
        record = {"index": index, "actual": None, "error": None}
        try:
            args = _h_decode(case["input"])
            if isinstance(args, (list, tuple)):
                record["actual"] = entry(*args)
            else:
                record["actual"] = entry(args)
        except Exception as exc:
            record["error"] = "%s: %s" % (type(exc).__name__, exc)
        if record["error"] is None:
            _h_check_encodable(record)
        results.append(record)
    _h_emit(results)
    return 0


_h_sys.exit(_h_main())
"#;

const JAVASCRIPT_RUNNER: &str = r#"

// ---- test runner ----
;(() => {
  const __hCases = @@CASES@@;
  const __hEmit = (payload) =>
    process.stdout.write("\n@@MARKER@@" + JSON.stringify(payload) + "\n");
  const __hCandidates = [
@@CANDIDATES@@
  ];
  const __hEntry = __hCandidates.find((fn) => typeof fn === "function");
  if (!__hEntry) {
    __hEmit({ harness_error: "no entry point found: @@GUIDANCE@@" });
    process.exitCode = 3;
    return;
  }
  const __hDecode = (text) => {
    try {
      return JSON.parse(text);
    } catch (_) {
      return text;
    }
  };
  const __hResults = __hCases.map((testCase, i) => {
    const record = { index: i + 1, actual: null, error: null };
    try {
      const args = __hDecode(testCase.input);
      const value = Array.isArray(args) ? __hEntry(...args) : __hEntry(args);
      record.actual = value === undefined ? null : value;
    } catch (err) {
      record.error = err instanceof Error ? `${err.name}: ${err.message}` : String(err);
    }
    if (record.error === null) {
      try {
        JSON.stringify(record.actual);
      } catch (err) {
        record.actual = null;
        record.error = `${err.name}: return value is not JSON compatible (${err.message})`;
      }
    }
    return record;
  });
  __hEmit(__hResults);
})();
"#;

fn guidance() -> String {
    format!("define a function named {}", ENTRY_NAMES.join(", "))
}

/// Produces the harness file: the user's code followed by a generated runner
///
/// The runner embeds the case inputs as data and never interpolates them into
/// code, so inputs containing quotes or newlines are inert.
pub(super) fn render(
    language: Language,
    code: &str,
    cases: &[TestCase],
) -> Result<String, SetupError> {
    let inputs: Vec<_> = cases.iter().map(|c| json!({ "input": c.input })).collect();
    let payload = serde_json::to_string(&inputs)
        .map_err(|e| SetupError::Infrastructure(format!("could not encode test cases: {e}")))?;

    let runner = match language {
        Language::Python => {
            // A JSON string literal is also a valid Python string literal
            let literal = serde_json::to_string(&payload).map_err(|e| {
                SetupError::Infrastructure(format!("could not encode test cases: {e}"))
            })?;
            let names = ENTRY_NAMES.map(|n| format!("\"{n}\"")).join(", ");
            PYTHON_RUNNER
                .replace("@@CASES@@", &literal)
                .replace("@@ENTRY_NAMES@@", &format!("({names})"))
        }
        Language::JavaScript => {
            let candidates = ENTRY_NAMES
                .map(|n| format!("    typeof {n} === \"undefined\" ? undefined : {n},"))
                .join("\n");
            JAVASCRIPT_RUNNER
                .replace("@@CASES@@", &payload)
                .replace("@@CANDIDATES@@", &candidates)
        }
        other => {
            return Err(SetupError::Infrastructure(format!(
                "no harness template for {other}"
            )));
        }
    };

    let runner = runner
        .replace("@@MARKER@@", RESULT_MARKER)
        .replace("@@GUIDANCE@@", &guidance());
    Ok(format!("{}\n{runner}", code.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_harness_embeds_cases_as_data() {
        let cases = [TestCase::new(r#"["a\"b", "c\nd"]"#, "x")];
        let source = render(Language::Python, "def solution(a, b):\n    return a + b\n", &cases).unwrap();

        assert!(source.starts_with("def solution(a, b):"));
        assert!(source.contains(r#"_H_ENTRY_NAMES = ("solution", "solve", "solucion")"#));
        assert!(source.contains("\\\"input\\\""));
        assert!(source.contains("__HARNESS_RESULT__ "));
        assert!(source.contains("allow_nan=False"));
        assert!(!source.contains("@@"));
    }

    #[test]
    fn test_javascript_harness() {
        let cases = [TestCase::new("[1, 2]", "3")];
        let source = render(Language::JavaScript, "function solve(a, b) { return a + b; }", &cases).unwrap();

        assert!(source.contains(r#"const __hCases = [{"input":"[1, 2]"}];"#));
        assert!(source.contains("typeof solucion === \"undefined\" ? undefined : solucion,"));
        assert!(source.contains("process.exitCode = 3"));
        assert!(!source.contains("@@"));
    }

    #[test]
    fn test_no_template_for_pending_languages() {
        let err = render(Language::Java, "class A {}", &[]).unwrap_err();
        assert!(matches!(err, SetupError::Infrastructure(_)));
    }
}
