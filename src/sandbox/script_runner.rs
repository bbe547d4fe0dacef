use std::sync::Arc;

use parking_lot::Mutex;

use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FnAccess, Scope};
use serde_json::Value;

use crate::codec::ParsedValue;
use crate::config::Isolation;
use crate::error::SetupError;
use crate::language::Language;
use crate::model::{CaseResult, TestCase};

use super::watchdog::Watchdog;
use super::{Budget, SandboxRunner, restricted};

/// Runs Rhai submissions inside this process
///
/// In `Restricted` mode the code goes through the static pre-check, executes on
/// an allow-listed engine under a wall-clock deadline, and must expose
/// `solution`. In `Trusted` mode the full engine is used with no deadline and
/// the first public function becomes the entry point.
pub struct ScriptRunner {
    isolation: Isolation,
}

/// A loaded submission, ready to have its entry point invoked
struct Session {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    entry: String,
    output: PrintBuffer,
}

impl SandboxRunner for ScriptRunner {
    fn language(&self) -> Language {
        Language::Rhai
    }

    fn name(&self) -> &'static str {
        match self.isolation {
            Isolation::Restricted => "restricted script runner",
            Isolation::Trusted => "trusted script runner",
        }
    }

    fn run(
        &self,
        code: &str,
        cases: &[TestCase],
        budget: &Budget,
    ) -> Result<Vec<CaseResult>, SetupError> {
        match self.isolation {
            Isolation::Restricted => {
                restricted::check_source(code)?;
                // Armed before compiling so the deadline covers the whole body
                let watchdog = Watchdog::arm(budget.run);
                let cancel = watchdog.handle();

                let mut engine = restricted::engine(budget.memory_limit);
                engine.on_progress(move |operations| {
                    cancel.is_cancelled(operations).then_some(Dynamic::UNIT)
                });

                let mut session = Self::load(engine, code, budget, |_, ast| {
                    Self::restricted_entry_point(ast)
                })?;
                let results = session.run_cases(cases, budget);
                drop(watchdog);
                results
            }
            Isolation::Trusted => {
                let mut session =
                    Self::load(Engine::new(), code, budget, Self::discover_entry_point)?;
                session.run_cases(cases, budget)
            }
        }
    }
}

impl ScriptRunner {
    pub fn new(isolation: Isolation) -> Self {
        Self { isolation }
    }

    /// Compiles the code, runs its top level once, and locates the entry point
    fn load(
        mut engine: Engine,
        code: &str,
        budget: &Budget,
        locate: impl FnOnce(&str, &AST) -> Result<String, SetupError>,
    ) -> Result<Session, SetupError> {
        let output = PrintBuffer::new(budget.max_output_bytes);
        output.attach(&mut engine);

        let ast = engine
            .compile(code)
            .map_err(|e| SetupError::Load(e.to_string()))?;
        let entry = locate(code, &ast)?;

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| load_error(&e, budget))?;

        log::debug!("Loaded script, entry point '{entry}'");
        Ok(Session {
            engine,
            ast,
            scope,
            entry,
            output,
        })
    }

    fn restricted_entry_point(ast: &AST) -> Result<String, SetupError> {
        let found = ast
            .iter_functions()
            .any(|f| f.name == restricted::ENTRY_POINT && !matches!(f.access, FnAccess::Private));
        if found {
            Ok(restricted::ENTRY_POINT.to_string())
        } else {
            Err(SetupError::MissingEntryPoint(
                restricted::ENTRY_POINT_GUIDANCE.to_string(),
            ))
        }
    }

    /// Picks the first public function, in source order, as the entry point
    fn discover_entry_point(code: &str, ast: &AST) -> Result<String, SetupError> {
        let mut candidates: Vec<(usize, String)> = ast
            .iter_functions()
            .filter(|f| !matches!(f.access, FnAccess::Private) && !f.name.starts_with('_'))
            .map(|f| (definition_offset(code, f.name), f.name.to_string()))
            .collect();
        candidates.sort();
        // Overloads of different arity share a name
        candidates.dedup_by(|a, b| a.1 == b.1);

        match candidates.as_slice() {
            [] => Err(SetupError::MissingEntryPoint(
                "define a function, e.g. `fn solution(a, b) { a + b }`".to_string(),
            )),
            [(_, only)] => Ok(only.clone()),
            [(_, first), rest @ ..] => {
                let others: Vec<&str> = rest.iter().map(|(_, name)| name.as_str()).collect();
                log::warn!(
                    "Several candidate entry points, using '{first}' (also found: {})",
                    others.join(", ")
                );
                Ok(first.clone())
            }
        }
    }
}

impl Session {
    fn run_cases(
        &mut self,
        cases: &[TestCase],
        budget: &Budget,
    ) -> Result<Vec<CaseResult>, SetupError> {
        let mut results = Vec::with_capacity(cases.len());

        for (i, case) in cases.iter().enumerate() {
            let index = i + 1;
            self.output.clear();

            let result = match decode_arguments(&case.input) {
                Ok(args) => {
                    let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
                    match self.engine.call_fn_with_options::<Dynamic>(
                        options,
                        &mut self.scope,
                        &self.ast,
                        &self.entry,
                        args,
                    ) {
                        Ok(value) => CaseResult::evaluated(index, case, &to_json(&value)),
                        Err(e) if is_terminated(&e) => {
                            return Err(SetupError::TimeLimit(budget.run));
                        }
                        Err(e) => CaseResult::errored(index, case, describe(&e)),
                    }
                }
                Err(e) => CaseResult::errored(index, case, format!("could not decode input: {e}")),
            };

            log::trace!("Case {index}: passed = {}", result.passed);
            results.push(result.with_stdout(self.output.take()));
        }

        Ok(results)
    }
}

/// Decodes a case input; arrays are spread across the entry point's parameters
fn decode_arguments(input: &str) -> Result<Vec<Dynamic>, Box<EvalAltResult>> {
    match ParsedValue::parse(input).into_value() {
        Value::Array(items) => items.into_iter().map(to_dynamic).collect(),
        other => Ok(vec![to_dynamic(other)?]),
    }
}

fn to_json(value: &Dynamic) -> Value {
    from_dynamic::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn is_terminated(error: &EvalAltResult) -> bool {
    match error {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_terminated(inner),
        _ => false,
    }
}

fn is_data_too_large(error: &EvalAltResult) -> bool {
    match error {
        EvalAltResult::ErrorDataTooLarge(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_data_too_large(inner),
        _ => false,
    }
}

fn describe(error: &EvalAltResult) -> String {
    if is_data_too_large(error) {
        format!("memory limit exceeded: {error}")
    } else {
        error.to_string()
    }
}

fn load_error(error: &EvalAltResult, budget: &Budget) -> SetupError {
    if is_terminated(error) {
        SetupError::TimeLimit(budget.run)
    } else {
        SetupError::Load(describe(error))
    }
}

/// Byte offset of `fn <name>` in the source, used to order candidates
fn definition_offset(code: &str, name: &str) -> usize {
    code.match_indices(name)
        .find(|(pos, _)| {
            let head = &code[..*pos];
            let before = head.trim_end();
            let after = code[pos + name.len()..].trim_start();
            head.ends_with(char::is_whitespace)
                && before.ends_with("fn")
                && before[..before.len() - 2]
                    .chars()
                    .next_back()
                    .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
                && after.starts_with('(')
        })
        .map_or(usize::MAX, |(pos, _)| pos)
}

/// Captures `print` and `debug` output of the current case, up to a byte cap
#[derive(Clone)]
struct PrintBuffer {
    text: Arc<Mutex<String>>,
    limit: usize,
}

impl PrintBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: Arc::new(Mutex::new(String::new())),
            limit,
        }
    }

    fn attach(&self, engine: &mut Engine) {
        let printer = self.clone();
        engine.on_print(move |line| printer.push_line(line));
        let debugger = self.clone();
        engine.on_debug(move |line, _source, _pos| debugger.push_line(line));
    }

    fn push_line(&self, line: &str) {
        let mut text = self.text.lock();
        if text.len() >= self.limit {
            return;
        }
        let room = self.limit - text.len();
        let mut end = line.len().min(room);
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        text.push_str(&line[..end]);
        text.push('\n');
    }

    fn clear(&self) {
        self.text.lock().clear();
    }

    fn take(&self) -> String {
        std::mem::take(&mut *self.text.lock())
    }
}
