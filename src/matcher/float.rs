//! Floating-point matcher

use indexmap::IndexMap;

use crate::common::Result;
use crate::store::DataStore;
use crate::value::Value;

use super::{
    bad_var_err, check_existence, malformed_err, match_pattern, mismatched_err, pattern_err,
    value_err, Existence, FieldProps, MatchOutcome, ANY, KEY_MATCHES, TYPE_NUM,
};

/// Matches a number by exact value or pattern.
#[derive(Debug, Clone)]
pub struct FloatMatcher {
    pub value: Option<f64>,
    pub pattern: Option<String>,
    pub props: FieldProps,
}

impl FloatMatcher {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<FloatMatcher> {
        let mut value = None;
        let mut pattern = None;
        if let Some(m) = node.get(KEY_MATCHES) {
            match m {
                Value::Float(f) => value = Some(*f),
                Value::Int(i) => value = Some(*i as f64),
                Value::Str(s) => pattern = Some(s.clone()),
                _ => return Err(malformed_err(KEY_MATCHES, TYPE_NUM, parent)),
            }
        }
        Ok(FloatMatcher {
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
            Value::Float(f) => *f,
            Value::Int(i) => *i as f64,
            other => return Ok(MatchOutcome::fail(mismatched_err(TYPE_NUM, other))),
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
            } else if match_pattern(&resolved, &actual.to_string())? {
                MatchOutcome::pass(actual.to_string())
            } else {
                MatchOutcome::fail(pattern_err(actual, &resolved))
            }
        } else {
            MatchOutcome::pass(actual.to_string())
        };

        Ok(outcome.with_capture(&self.props, value))
    }
}
