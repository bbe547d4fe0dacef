use serde_json::{Map, Number, Value};

/// Decoded form of a test-case `input` or `expectedOutput` string
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    /// Accepted by the JSON decoder
    Structured(Value),
    /// Accepted by the permissive literal parser
    Literal(Value),
    /// Neither decoder accepted the text
    Raw(String),
}

impl ParsedValue {
    /// Decodes `text`: JSON first, then literal expressions, then the raw string
    pub fn parse(text: &str) -> Self {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return Self::Structured(value);
        }
        match parse_literal(text) {
            Some(value) => Self::Literal(value),
            None => Self::Raw(text.to_string()),
        }
    }

    pub fn is_decoded(&self) -> bool {
        !matches!(self, Self::Raw(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) | Self::Literal(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    /// Collapses into a value; raw text becomes a string value
    pub fn into_value(self) -> Value {
        match self {
            Self::Structured(v) | Self::Literal(v) => v,
            Self::Raw(s) => Value::String(s),
        }
    }

    /// Canonical string rendering used by the fallback comparison
    pub fn render(&self) -> String {
        match self {
            Self::Structured(v) | Self::Literal(v) => render(v),
            Self::Raw(s) => s.trim().to_string(),
        }
    }
}

/// Decides whether an actual return value satisfies the expected output
///
/// Structural equality on decoded forms is tried first; when it fails, or the
/// expectation could not be decoded, the canonical renderings are compared.
pub fn equivalent(actual: &Value, expected: &ParsedValue) -> bool {
    let structural = expected
        .value()
        .is_some_and(|expected| structurally_equal(actual, expected));
    structural || render(actual) == expected.render()
}

/// Same rule as [`equivalent`] for two raw output strings
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    let actual = ParsedValue::parse(actual).into_value();
    equivalent(&actual, &ParsedValue::parse(expected))
}

/// Deep equality that treats integer and float representations of the same number as equal
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| structurally_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| structurally_equal(v, w)))
        }
        _ => false,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Canonical rendering: top-level strings bare, everything else in a spaced JSON form
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            render_nested(other, &mut out);
            out
        }
    }
}

fn render_nested(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_nested(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(": ");
                render_nested(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Parses literal expressions that are not strict JSON
///
/// Accepts single-quoted strings, `True`/`False`/`None`, tuples, sets, trailing
/// commas, non-string dictionary keys and a bare comma-separated top level.
pub fn parse_literal(text: &str) -> Option<Value> {
    let mut parser = LiteralParser {
        chars: text.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.parse_top_level()?;
    parser.skip_whitespace();
    parser.at_end().then_some(value)
}

/// Same nesting ceiling serde_json applies
const MAX_NESTING: usize = 128;

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_top_level(&mut self) -> Option<Value> {
        let first = self.parse_value()?;
        if !self.eat(',') {
            return Some(first);
        }
        let mut items = vec![first];
        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }
            items.push(self.parse_value()?);
            if !self.eat(',') {
                break;
            }
        }
        Some(Value::Array(items))
    }

    fn parse_value(&mut self) -> Option<Value> {
        self.skip_whitespace();
        match self.peek()? {
            '[' | '(' | '{' => self.parse_nested(),
            '"' | '\'' => self.parse_string().map(Value::String),
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.parse_number(),
            c if c.is_alphabetic() || c == '_' => self.parse_word(),
            _ => None,
        }
    }

    fn parse_nested(&mut self) -> Option<Value> {
        if self.depth >= MAX_NESTING {
            return None;
        }
        self.depth += 1;
        let value = match self.peek()? {
            '[' => {
                self.pos += 1;
                self.parse_items(']').map(Value::Array)
            }
            '(' => self.parse_parenthesized(),
            _ => self.parse_braced(),
        };
        self.depth -= 1;
        value
    }

    /// Comma separated values up to `close`, trailing comma allowed
    fn parse_items(&mut self, close: char) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Some(items);
            }
            items.push(self.parse_value()?);
            if !self.eat(',') {
                return self.eat(close).then_some(items);
            }
        }
    }

    fn parse_parenthesized(&mut self) -> Option<Value> {
        self.pos += 1;
        if self.eat(')') {
            return Some(Value::Array(Vec::new()));
        }
        let first = self.parse_value()?;
        if self.eat(')') {
            // plain grouping, not a tuple
            return Some(first);
        }
        if !self.eat(',') {
            return None;
        }
        let mut rest = self.parse_items(')')?;
        rest.insert(0, first);
        Some(Value::Array(rest))
    }

    fn parse_braced(&mut self) -> Option<Value> {
        self.pos += 1;
        if self.eat('}') {
            return Some(Value::Object(Map::new()));
        }
        let first = self.parse_value()?;
        if !self.eat(':') {
            // set literal, kept as an ordered list
            if self.eat('}') {
                return Some(Value::Array(vec![first]));
            }
            if !self.eat(',') {
                return None;
            }
            let mut rest = self.parse_items('}')?;
            rest.insert(0, first);
            return Some(Value::Array(rest));
        }

        let mut map = Map::new();
        let mut key = first;
        loop {
            let value = self.parse_value()?;
            map.insert(key_string(key), value);
            if !self.eat(',') {
                return self.eat('}').then_some(Value::Object(map));
            }
            if self.eat('}') {
                return Some(Value::Object(map));
            }
            key = self.parse_value()?;
            if !self.eat(':') {
                return None;
            }
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'x' => out.push(self.parse_hex_escape(2)?),
                    'u' => out.push(self.parse_hex_escape(4)?),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    fn parse_hex_escape(&mut self, digits: usize) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            code = code * 16 + self.bump()?.to_digit(16)?;
        }
        char::from_u32(code)
    }

    fn parse_number(&mut self) -> Option<Value> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('-' | '+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_' && **c != '+')
            .collect();
        if !text.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Some(Value::from(n));
            }
            if let Ok(n) = text.parse::<u64>() {
                return Some(Value::from(n));
            }
        }
        let n = text.parse::<f64>().ok()?;
        Number::from_f64(n).map(Value::Number)
    }

    fn parse_word(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            "None" | "null" | "nil" => Some(Value::Null),
            _ => None,
        }
    }
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => render(&other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_prefers_json() {
        assert_eq!(ParsedValue::parse("[2, 3]"), ParsedValue::Structured(json!([2, 3])));
        assert_eq!(ParsedValue::parse("\"hi\""), ParsedValue::Structured(json!("hi")));
        assert_eq!(ParsedValue::parse("null"), ParsedValue::Structured(Value::Null));
    }

    #[test]
    fn test_parse_literal_fallback() {
        assert_eq!(
            ParsedValue::parse("('a', True, None)"),
            ParsedValue::Literal(json!(["a", true, null]))
        );
        assert_eq!(ParsedValue::parse("[1, 2,]"), ParsedValue::Literal(json!([1, 2])));
        assert_eq!(
            ParsedValue::parse("{1: 'one', 'two': 2}"),
            ParsedValue::Literal(json!({"1": "one", "two": 2}))
        );
        assert_eq!(ParsedValue::parse("2, 3"), ParsedValue::Literal(json!([2, 3])));
        assert_eq!(ParsedValue::parse("(7)"), ParsedValue::Literal(json!(7)));
        assert_eq!(ParsedValue::parse("(7,)"), ParsedValue::Literal(json!([7])));
        assert_eq!(ParsedValue::parse("1_000"), ParsedValue::Literal(json!(1000)));
        assert_eq!(ParsedValue::parse("{3, 1}"), ParsedValue::Literal(json!([3, 1])));
    }

    #[test]
    fn test_parse_raw_fallback() {
        assert_eq!(
            ParsedValue::parse("hello world"),
            ParsedValue::Raw("hello world".to_string())
        );
        assert_eq!(ParsedValue::parse("[1, 2"), ParsedValue::Raw("[1, 2".to_string()));
        assert!(!ParsedValue::parse("f(x)").is_decoded());
    }

    #[test]
    fn test_deep_nesting_falls_back_to_raw() {
        let deep = "[".repeat(200_000);
        assert_eq!(ParsedValue::parse(&deep), ParsedValue::Raw(deep.clone()));

        let tuples = format!("{}1{}", "(".repeat(500), ",)".repeat(500));
        assert!(!ParsedValue::parse(&tuples).is_decoded());

        let shallow = format!("{}1,{}", "(".repeat(10), ")".repeat(10));
        assert!(ParsedValue::parse(&shallow).is_decoded());
    }

    #[test]
    fn test_numeric_representation_drift() {
        assert!(outputs_match("3.0", "3"));
        assert!(outputs_match("3", "3.0"));
        assert!(!outputs_match("3.5", "3"));
        assert!(equivalent(&json!([1.0, 2]), &ParsedValue::parse("(1, 2.0)")));
    }

    #[test]
    fn test_structural_mismatch() {
        assert!(!equivalent(&json!(6), &ParsedValue::parse("5")));
        assert!(!equivalent(&json!([1, 2]), &ParsedValue::parse("[1, 2, 3]")));
        assert!(!equivalent(&json!({"a": 1}), &ParsedValue::parse("{\"a\": 2}")));
    }

    #[test]
    fn test_rendering_fallback() {
        // raw expectation compared against the rendered value
        assert!(equivalent(&json!("hello world"), &ParsedValue::parse("hello world")));
        assert!(equivalent(&json!([1, "a"]), &ParsedValue::parse(" [1, \"a\"] ")));
        // bool and string "true" differ structurally but render the same
        assert!(equivalent(&json!("true"), &ParsedValue::parse("true")));
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("plain")), "plain");
        assert_eq!(render(&json!([1, "a", null])), "[1, \"a\", null]");
        assert_eq!(render(&json!({"k": [true]})), "{\"k\": [true]}");
        assert_eq!(render(&json!(2.5)), "2.5");
    }
}
