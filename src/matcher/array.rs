//! Array matcher

use indexmap::IndexMap;

use crate::common::Result;
use crate::store::DataStore;
use crate::value::Value;

use super::{
    array_length_err, bad_var_err, check_existence, evaluate_num_expr, malformed_err,
    mismatched_err, Existence, FieldProps, MatchOutcome, ANY, KEY_ITEMS, KEY_LENGTH,
    KEY_SORTED, NOT_EMPTY, TYPE_ARRAY,
};

/// Matches a sequence by length, exact or expression, and carries the
/// item definitions the schema loader expands into child matchers.
#[derive(Debug, Clone)]
pub struct ArrayMatcher {
    pub length: Option<i64>,
    pub length_expr: Option<String>,
    pub items: Vec<Value>,
    pub sorted: bool,
    pub props: FieldProps,
}

impl ArrayMatcher {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<ArrayMatcher> {
        let mut props = FieldProps::parse(parent, node)?;
        // a missing array and an empty array read the same to a length check
        props.nullable = true;

        let mut length = None;
        let mut length_expr = None;
        if let Some(v) = node.get(KEY_LENGTH) {
            match v {
                Value::Int(i) => length = Some(*i),
                Value::Float(f) => length = Some(*f as i64),
                Value::Str(s) => length_expr = Some(s.clone()),
                _ => return Err(malformed_err(KEY_LENGTH, TYPE_ARRAY, parent)),
            }
        }

        let mut items = Vec::new();
        if let Some(v) = node.get(KEY_ITEMS) {
            if props.exists {
                match v {
                    Value::Seq(seq) => items = seq.clone(),
                    _ => return Err(malformed_err(KEY_ITEMS, TYPE_ARRAY, parent)),
                }
            }
        }

        let sorted = match node.get(KEY_SORTED) {
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(malformed_err(KEY_SORTED, super::TYPE_BOOL, parent)),
            None => true,
        };

        Ok(ArrayMatcher {
            length,
            length_expr,
            items,
            sorted,
            props,
        })
    }

    pub fn evaluate(&self, value: &Value, store: &DataStore) -> Result<MatchOutcome> {
        match check_existence(value, self.props.exists, self.props.nullable) {
            Existence::Fail(msg) => return Ok(MatchOutcome::fail(msg)),
            Existence::PassAndSkip => return Ok(MatchOutcome::pass("")),
            Existence::Evaluate => {}
        }

        // null still gets its length validated, in case a non-zero length
        // was expected
        let empty = Vec::new();
        let seq = match value {
            Value::Null => &empty,
            Value::Seq(s) => s,
            other => return Ok(MatchOutcome::fail(mismatched_err(TYPE_ARRAY, other))),
        };
        let actual = seq.len() as i64;

        let outcome = if let Some(expected) = self.length {
            if actual == expected {
                MatchOutcome::pass(length_msg(actual))
            } else {
                MatchOutcome::fail(array_length_err("=", expected, actual))
            }
        } else if let Some(expr) = &self.length_expr {
            let resolved = store
                .expand_variable(expr)
                .map_err(|_| bad_var_err(expr))?
                .to_text_or(expr);

            match resolved.as_str() {
                NOT_EMPTY => {
                    if actual > 0 {
                        MatchOutcome::pass(length_msg(actual))
                    } else {
                        MatchOutcome::fail(array_length_err(">", 0, actual))
                    }
                }
                ANY => MatchOutcome::pass(length_msg(actual)),
                _ => match evaluate_num_expr(&resolved, actual) {
                    Some((true, _)) => MatchOutcome::pass(length_msg(actual)),
                    Some((false, message)) => {
                        MatchOutcome::fail(format!("[{}] {}", KEY_LENGTH, message))
                    }
                    None => MatchOutcome::fail(format!(
                        "[{}] unrecognized length expression '{}'",
                        KEY_LENGTH, resolved
                    )),
                },
            }
        } else {
            MatchOutcome::pass(length_msg(actual))
        };

        Ok(outcome.with_capture(&self.props, value))
    }
}

fn length_msg(len: i64) -> String {
    format!("[{}] {}", KEY_LENGTH, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_matcher(yaml: &str) -> ArrayMatcher {
        let node = Value::from_yaml_str(yaml).unwrap();
        ArrayMatcher::parse(&node, node.as_map().unwrap()).unwrap()
    }

    fn seq_of(n: usize) -> Value {
        Value::Seq((0..n as i64).map(Value::Int).collect())
    }

    #[test]
    fn test_exact_length() {
        let m = parse_matcher("length: 2");
        assert!(m.evaluate(&seq_of(2), &DataStore::new()).unwrap().status);
        let out = m.evaluate(&seq_of(3), &DataStore::new()).unwrap();
        assert!(!out.status);
        assert!(out.message.contains("length = 2"));
    }

    #[test]
    fn test_length_expression() {
        let m = parse_matcher("length: \"$>= 3\"");
        assert!(m.evaluate(&seq_of(3), &DataStore::new()).unwrap().status);
        let out = m.evaluate(&seq_of(2), &DataStore::new()).unwrap();
        assert!(!out.status);
        assert!(out
            .message
            .contains("Expected a result evaluating to: >= 3 but got 2"));
    }

    #[test]
    fn test_not_empty() {
        let m = parse_matcher("length: $notEmpty");
        assert!(m.evaluate(&seq_of(1), &DataStore::new()).unwrap().status);
        assert!(!m.evaluate(&seq_of(0), &DataStore::new()).unwrap().status);
    }

    #[test]
    fn test_null_array_validates_length() {
        let m = parse_matcher("length: 0");
        assert!(m.evaluate(&Value::Null, &DataStore::new()).unwrap().status);
        let m = parse_matcher("length: 2");
        assert!(!m.evaluate(&Value::Null, &DataStore::new()).unwrap().status);
    }

    #[test]
    fn test_sorted_defaults_true() {
        let m = parse_matcher("length: 1");
        assert!(m.sorted);
        let m = parse_matcher("length: 1\nsorted: false");
        assert!(!m.sorted);
    }
}
