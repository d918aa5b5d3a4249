//! Integer matcher

use indexmap::IndexMap;

use crate::common::Result;
use crate::store::DataStore;
use crate::value::Value;

use super::{
    bad_var_err, check_existence, evaluate_num_expr, malformed_err, match_pattern,
    mismatched_err, pattern_err, value_err, Existence, FieldProps, MatchOutcome, ANY,
    KEY_MATCHES, TYPE_INT,
};

/// Matches an integer by exact value, numeric expression, or pattern.
#[derive(Debug, Clone)]
pub struct IntegerMatcher {
    pub value: Option<i64>,
    pub pattern: Option<String>,
    pub props: FieldProps,
}

impl IntegerMatcher {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<IntegerMatcher> {
        let mut value = None;
        let mut pattern = None;
        if let Some(m) = node.get(KEY_MATCHES) {
            match m {
                Value::Int(i) => value = Some(*i),
                Value::Float(f) => value = Some(*f as i64),
                Value::Str(s) => pattern = Some(s.clone()),
                _ => return Err(malformed_err(KEY_MATCHES, TYPE_INT, parent)),
            }
        }
        Ok(IntegerMatcher {
            value,
            pattern,
            props: FieldProps::parse(parent, node)?,
        })
    }

    pub fn evaluate(&self, value: &Value, store: &DataStore) -> Result<MatchOutcome> {
        match check_existence(value, self.props.exists, self.props.nullable) {
            Existence::Fail(msg) => return Ok(MatchOutcome::fail(msg)),
            Existence::PassAndSkip => return Ok(MatchOutcome::pass("")),
            Existence::Evaluate => {}
        }

        let actual = match value {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            other => return Ok(MatchOutcome::fail(mismatched_err(TYPE_INT, other))),
        };

        let outcome = if let Some(expected) = self.value {
            if expected == actual {
                MatchOutcome::pass(actual.to_string())
            } else {
                MatchOutcome::fail(value_err(expected, actual))
            }
        } else if let Some(pattern) = &self.pattern {
            let resolved = store
                .expand_variable(pattern)
                .map_err(|_| bad_var_err(pattern))?
                .to_text_or(pattern);

            if resolved == ANY {
                MatchOutcome::pass(actual.to_string())
            } else if let Some((status, message)) = evaluate_num_expr(&resolved, actual) {
                if status {
                    MatchOutcome::pass(actual.to_string())
                } else {
                    MatchOutcome::fail(message)
                }
            } else if match_pattern(&resolved, &actual.to_string())? {
                MatchOutcome::pass(actual.to_string())
            } else {
                MatchOutcome::fail(pattern_err(actual, &resolved))
            }
        } else {
            // no constraint: the type check above is the assertion
            MatchOutcome::pass(actual.to_string())
        };

        Ok(outcome.with_capture(&self.props, value))
    }
}
