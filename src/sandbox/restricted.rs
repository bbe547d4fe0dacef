use std::collections::HashSet;

use rhai::Engine;
use rhai::packages::{
    ArithmeticPackage, BasicArrayPackage, BasicIteratorPackage, BasicMapPackage,
    BasicMathPackage, BasicStringPackage, LogicPackage, MoreStringPackage, Package,
};

use crate::error::SetupError;

/// The only entry point a restricted submission may expose
pub(super) const ENTRY_POINT: &str = "solution";

pub(super) const ENTRY_POINT_GUIDANCE: &str =
    "define a function named `solution`, e.g. `fn solution(nums) { nums.len() }`";

/// Symbols that reach dynamic code loading or indirect calls
const FORBIDDEN: &[&str] = &["import", "export", "eval", "Fn", "call", "curry"];

/// Built-in functions and methods a restricted submission may call
const ALLOWED_CALLS: &[&str] = &[
    // numbers
    "abs", "sign", "min", "max", "floor", "ceiling", "round", "int", "fraction", "sqrt", "exp",
    "ln", "log", "sin", "cos", "tan", "to_int", "to_float", "to_string", "parse_int",
    "parse_float", "is_odd", "is_even", "is_zero",
    // strings
    "len", "is_empty", "trim", "to_upper", "to_lower", "chars", "to_chars", "split",
    "split_rev", "sub_string", "index_of", "contains", "starts_with", "ends_with", "replace",
    "pad", "crop", "truncate", "clear", "get", "set", "reverse",
    // arrays and maps
    "push", "pop", "shift", "insert", "remove", "append", "extract", "drain", "retain",
    "splice", "sort", "dedup", "filter", "map", "reduce", "reduce_rev", "all", "some", "find",
    "find_index", "zip", "keys", "values", "range",
    // output
    "print", "debug",
];

const KEYWORDS: &[&str] = &[
    "if", "else", "while", "loop", "for", "in", "do", "until", "switch", "return", "throw",
    "try", "catch", "fn", "let", "const", "private", "this", "break", "continue",
];

/// Builds the allow-listed interpreter used for untrusted submissions
///
/// Starts from a raw engine and registers only the pure-computation
/// packages, so nothing reaching the filesystem, the clock, or module
/// loading is available.
pub(super) fn engine(memory_limit: u64) -> Engine {
    let mut engine = Engine::new_raw();

    ArithmeticPackage::new().register_into_engine(&mut engine);
    LogicPackage::new().register_into_engine(&mut engine);
    BasicIteratorPackage::new().register_into_engine(&mut engine);
    BasicMathPackage::new().register_into_engine(&mut engine);
    BasicStringPackage::new().register_into_engine(&mut engine);
    MoreStringPackage::new().register_into_engine(&mut engine);
    BasicArrayPackage::new().register_into_engine(&mut engine);
    BasicMapPackage::new().register_into_engine(&mut engine);

    for symbol in FORBIDDEN {
        engine.disable_symbol(*symbol);
    }

    let bytes = usize::try_from(memory_limit).unwrap_or(usize::MAX);
    engine
        .set_max_string_size(bytes / 8)
        .set_max_array_size(bytes / 1024)
        .set_max_map_size(bytes / 1024)
        .set_max_call_levels(128)
        .set_max_expr_depths(64, 32);

    engine
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Punct(char),
}

/// Static pre-check run before the code is compiled
///
/// Rejects forbidden symbols outright and any call to a function that is
/// neither allow-listed nor defined by the submission itself.
pub(super) fn check_source(code: &str) -> Result<(), SetupError> {
    let tokens = tokenize(code);

    let defined: HashSet<&str> = tokens
        .windows(2)
        .filter_map(|pair| match pair {
            [Token::Ident(kw), Token::Ident(name)] if kw == "fn" => Some(name.as_str()),
            _ => None,
        })
        .collect();

    let mut violations: Vec<String> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let Token::Ident(name) = token else {
            continue;
        };

        let violation = if FORBIDDEN.contains(&name.as_str()) {
            format!("'{name}' is not permitted")
        } else {
            let is_call = matches!(tokens.get(i + 1), Some(Token::Punct('(')));
            let is_definition =
                i > 0 && matches!(&tokens[i - 1], Token::Ident(prev) if prev == "fn");
            if !is_call
                || is_definition
                || KEYWORDS.contains(&name.as_str())
                || ALLOWED_CALLS.contains(&name.as_str())
                || defined.contains(name.as_str())
            {
                continue;
            }
            format!("call to '{name}' is not permitted")
        };

        if !violations.contains(&violation) {
            violations.push(violation);
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SetupError::RestrictedCode(violations.join("; ")))
    }
}

/// Splits source into identifiers and punctuation, skipping comments and literals
///
/// Code inside `${...}` interpolations of back-tick strings is tokenized too.
fn tokenize(code: &str) -> Vec<Token> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    // Brace depths at which an open interpolation hands control back to its string
    let mut interpolations: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => i = skip_block_comment(&chars, i + 2),
            '"' | '\'' => i = skip_quoted(&chars, i + 1, c),
            '`' => i = skip_template(&chars, i + 1, &mut interpolations, depth),
            '{' => {
                depth += 1;
                tokens.push(Token::Punct('{'));
                i += 1;
            }
            '}' if interpolations.last() == Some(&depth) => {
                interpolations.pop();
                i = skip_template(&chars, i + 1, &mut interpolations, depth);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                tokens.push(Token::Punct('}'));
                i += 1;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ if c.is_ascii_digit() => {
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
            }
            _ => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
        }
    }

    tokens
}

fn skip_block_comment(chars: &[char], mut i: usize) -> usize {
    let mut nesting = 1;
    while i < chars.len() && nesting > 0 {
        match (chars[i], chars.get(i + 1)) {
            ('/', Some('*')) => {
                nesting += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                nesting -= 1;
                i += 2;
            }
            _ => i += 1,
        }
    }
    i
}

fn skip_quoted(chars: &[char], mut i: usize, quote: char) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Skips back-tick string text; stops early at `${`, recording where it resumes
fn skip_template(
    chars: &[char],
    mut i: usize,
    interpolations: &mut Vec<usize>,
    depth: usize,
) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return i + 1,
            '$' if chars.get(i + 1) == Some(&'{') => {
                interpolations.push(depth);
                return i + 2;
            }
            _ => i += 1,
        }
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(code: &str) -> String {
        check_source(code).unwrap_err().to_string()
    }

    #[test]
    fn test_accepts_plain_computation() {
        let code = r#"
            // helpers are fine
            fn helper(x) { x * 2 }
            fn solution(nums) {
                let total = 0;
                for n in nums { total += helper(n); }
                if total > 10 { print(`big ${total}`); }
                nums.sort();
                max(total, nums.len())
            }
        "#;
        assert!(check_source(code).is_ok());
    }

    #[test]
    fn test_rejects_forbidden_symbols() {
        assert!(violation(r#"fn solution() { eval("1 + 1") }"#).contains("'eval'"));
        assert!(violation(r#"import "fs" as fs; fn solution() { 1 }"#).contains("'import'"));
        assert!(violation("fn solution(f) { f.call(1) }").contains("'call'"));
    }

    #[test]
    fn test_rejects_unknown_calls() {
        let message = violation("fn solution() { timestamp() }");
        assert!(message.starts_with("restricted code check failed"));
        assert!(message.contains("call to 'timestamp'"));
    }

    #[test]
    fn test_ignores_comments_and_strings() {
        let code = r#"
            /* eval("x") /* nested */ still comment */
            fn solution() { "eval(1)" + 'x' } // import
        "#;
        assert!(check_source(code).is_ok());
    }

    #[test]
    fn test_inspects_interpolations() {
        let code = r#"fn solution(x) { `value: ${ eval("x") } done` }"#;
        assert!(violation(code).contains("'eval'"));

        let nested = r#"fn solution(x) { `a ${ #{ k: x }.len() } b` }"#;
        assert!(check_source(nested).is_ok());
    }

    #[test]
    fn test_reports_each_violation_once() {
        let message = violation("fn solution() { open(1); open(2); spawn() }");
        assert_eq!(message.matches("'open'").count(), 1);
        assert!(message.contains("'spawn'"));
    }

    #[test]
    fn test_engine_lacks_unsafe_symbols() {
        let engine = engine(128 * 1024 * 1024);
        assert!(engine.eval::<i64>("40 + 2").is_ok_and(|v| v == 42));
        assert!(engine.eval::<rhai::Dynamic>("timestamp()").is_err());
    }
}
