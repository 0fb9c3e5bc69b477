//! Filter predicates for table queries.
//!
//! A small OData-flavoured expression language evaluated against the JSON
//! form of an entity:
//!
//! ```text
//! expr       := and ("or" and)*
//! and        := unary ("and" unary)*
//! unary      := "not" unary | "(" expr ")" | comparison
//! comparison := field op literal
//! op         := eq | ne | gt | ge | lt | le
//! literal    := 'string' | number | true | false | null
//! ```
//!
//! Field names address nested objects with `/` (`address/city`). A missing
//! field evaluates as `null`. Ordering operators only compare numbers with
//! numbers and strings with strings; any other pairing is false.
//!
//! ```
//! use tablesync_core::filter::Filter;
//!
//! let filter = Filter::parse("intValue ge 10 and not (stringValue eq 'x')").unwrap();
//! assert!(filter.matches(&serde_json::json!({"intValue": 12, "stringValue": "y"})));
//! assert!(!filter.matches(&serde_json::json!({"intValue": 12, "stringValue": "x"})));
//! ```

use std::cmp::Ordering;
use std::str::FromStr;

use serde_json::Value;

use crate::error::CoreError;

/// Longest filter expression accepted.
pub const MAX_FILTER_LENGTH: usize = 2_048;

/// Deepest nesting of `not` and parentheses accepted.
pub const MAX_FILTER_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        if input.len() > MAX_FILTER_LENGTH {
            return Err(invalid(format!(
                "expression longer than {MAX_FILTER_LENGTH} characters"
            )));
        }
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let filter = parser.parse_or()?;
        match parser.peek() {
            None => Ok(filter),
            Some(token) => Err(invalid(format!("unexpected {token:?}"))),
        }
    }

    /// Evaluate the predicate against a JSON document.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::And(lhs, rhs) => lhs.matches(doc) && rhs.matches(doc),
            Filter::Or(lhs, rhs) => lhs.matches(doc) || rhs.matches(doc),
            Filter::Not(inner) => !inner.matches(doc),
            Filter::Compare { field, op, value } => {
                let actual = lookup(doc, field).unwrap_or(&Value::Null);
                compare(actual, *op, value)
            }
        }
    }
}

impl FromStr for Filter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(msg: String) -> CoreError {
    CoreError::Validation(format!("invalid filter: {msg}"))
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .try_fold(doc, |current, segment| current.get(segment))
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            ordering(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Lt => ordering(actual, expected) == Some(Ordering::Less),
        CompareOp::Le => matches!(
            ordering(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Literal(Value),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CoreError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        // '' inside a string is an escaped quote.
                        Some((_, '\'')) => {
                            if matches!(chars.peek(), Some((_, '\''))) {
                                chars.next();
                                text.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some((_, ch)) => text.push(ch),
                        None => {
                            return Err(invalid(format!("unterminated string at {start}")))
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            c if c == '-' || c.is_ascii_digit() => {
                let mut end = start;
                let mut prev = None;
                while let Some(&(i, ch)) = chars.peek() {
                    // A sign is only part of the number at the start or
                    // right after an exponent marker.
                    let sign_ok = i == start || matches!(prev, Some('e' | 'E'));
                    let accept = ch.is_ascii_digit()
                        || matches!(ch, '.' | 'e' | 'E')
                        || (matches!(ch, '-' | '+') && sign_ok);
                    if !accept {
                        break;
                    }
                    end = i + ch.len_utf8();
                    prev = Some(ch);
                    chars.next();
                }
                tokens.push(Token::Literal(parse_number(&input[start..end])?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '/' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(input[start..end].to_string()));
            }
            other => return Err(invalid(format!("unexpected character '{other}' at {start}"))),
        }
    }

    Ok(tokens)
}

fn parse_number(raw: &str) -> Result<Value, CoreError> {
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Value::from(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| invalid(format!("invalid number '{raw}'")))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Filter, CoreError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Filter::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Filter, CoreError> {
        let mut lhs = self.parse_unary()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_unary()?;
            lhs = Filter::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Enter one level of `not` or parentheses, bounded by [`MAX_FILTER_DEPTH`].
    fn nested<F>(&mut self, parse: F) -> Result<Filter, CoreError>
    where
        F: FnOnce(&mut Self) -> Result<Filter, CoreError>,
    {
        if self.depth >= MAX_FILTER_DEPTH {
            return Err(invalid(format!(
                "expression nested deeper than {MAX_FILTER_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_unary(&mut self) -> Result<Filter, CoreError> {
        if self.eat_keyword("not") {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Filter::Not(Box::new(inner)));
        }
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(invalid("missing closing parenthesis".into())),
                }
            }
            Some(Token::Word(field)) => self.parse_comparison(field),
            Some(other) => Err(invalid(format!("expected field name, found {other:?}"))),
            None => Err(invalid("unexpected end of expression".into())),
        }
    }

    fn parse_comparison(&mut self, field: String) -> Result<Filter, CoreError> {
        let op = match self.next() {
            Some(Token::Word(word)) => CompareOp::from_keyword(&word)
                .ok_or_else(|| invalid(format!("unknown operator '{word}'")))?,
            _ => return Err(invalid(format!("expected operator after '{field}'"))),
        };
        let value = match self.next() {
            Some(Token::Literal(value)) => value,
            Some(Token::Word(word)) => match word.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => return Err(invalid(format!("expected literal, found '{word}'"))),
            },
            _ => return Err(invalid(format!("expected literal after '{field}'"))),
        };
        Ok(Filter::Compare { field, op, value })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn doc() -> Value {
        json!({
            "id": "a1",
            "deleted": false,
            "stringValue": "it's",
            "intValue": 42,
            "doubleValue": 2.5,
            "nested": { "city": "Oslo" },
            "optional": null
        })
    }

    fn eval(expr: &str) -> bool {
        Filter::parse(expr).unwrap().matches(&doc())
    }

    #[test]
    fn numeric_comparisons() {
        assert!(eval("intValue eq 42"));
        assert!(eval("intValue eq 42.0"));
        assert!(eval("intValue gt 41"));
        assert!(eval("intValue ge 42"));
        assert!(!eval("intValue lt 42"));
        assert!(eval("doubleValue le 2.5"));
        assert!(eval("intValue gt -1"));
    }

    #[test]
    fn string_comparisons_and_escaped_quotes() {
        assert!(eval("stringValue eq 'it''s'"));
        assert!(eval("stringValue ne 'other'"));
        assert!(eval("stringValue gt 'a'"));
    }

    #[test]
    fn booleans_and_nulls() {
        assert!(eval("deleted eq false"));
        assert!(eval("optional eq null"));
        assert!(eval("missing eq null"));
        assert!(!eval("missing ne null"));
    }

    #[test]
    fn mismatched_types_do_not_order() {
        assert!(!eval("stringValue gt 1"));
        assert!(!eval("intValue lt 'z'"));
    }

    #[test]
    fn nested_paths() {
        assert!(eval("nested/city eq 'Oslo'"));
        assert!(!eval("nested/zip eq 'Oslo'"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // false and false or true => true
        assert!(eval("intValue eq 0 and intValue eq 1 or deleted eq false"));
        // false and (false or true) => false
        assert!(!eval("intValue eq 0 and (intValue eq 1 or deleted eq false)"));
    }

    #[test]
    fn not_negates() {
        assert!(eval("not intValue eq 0"));
        assert!(!eval("not (intValue eq 42)"));
    }

    #[test]
    fn parse_errors_are_validation_errors() {
        for bad in [
            "",
            "intValue",
            "intValue eq",
            "intValue like 3",
            "(intValue eq 3",
            "intValue eq 3)",
            "stringValue eq 'open",
            "intValue eq 3 $",
            "intValue eq other",
        ] {
            assert_matches!(Filter::parse(bad), Err(CoreError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn overlong_expressions_are_rejected() {
        let expr = format!("stringValue eq '{}'", "x".repeat(MAX_FILTER_LENGTH));
        assert!(Filter::parse(&expr).is_err());
    }

    #[test]
    fn deeply_nested_parentheses_are_rejected() {
        let expr = format!("{}intValue eq 42{}", "(".repeat(1000), ")".repeat(1000));
        assert_matches!(Filter::parse(&expr), Err(CoreError::Validation(msg)) if msg.contains("nested"));
    }

    #[test]
    fn long_not_chains_are_rejected() {
        let expr = format!("{}intValue eq 42", "not ".repeat(500));
        assert_matches!(Filter::parse(&expr), Err(CoreError::Validation(msg)) if msg.contains("nested"));
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let depth = MAX_FILTER_DEPTH;
        let expr = format!("{}intValue eq 42{}", "(".repeat(depth), ")".repeat(depth));
        assert!(eval(&expr));

        let expr = format!("{}intValue eq 42", "not ".repeat(depth));
        assert!(eval(&expr));

        let expr = format!("{}intValue eq 42{}", "(".repeat(depth + 1), ")".repeat(depth + 1));
        assert!(Filter::parse(&expr).is_err());
    }
}
