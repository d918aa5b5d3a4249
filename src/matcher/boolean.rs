//! Boolean matcher

use indexmap::IndexMap;

use crate::common::Result;
use crate::store::DataStore;
use crate::value::Value;

use super::{
    bad_var_err, check_existence, malformed_err, mismatched_err, pattern_err, value_err,
    Existence, FieldProps, MatchOutcome, ANY, KEY_MATCHES, TYPE_BOOL,
};

/// Matches a boolean by literal value, `$any`, or a boolean literal in
/// string form (possibly produced by variable expansion).
#[derive(Debug, Clone)]
pub struct BoolMatcher {
    pub value: Option<bool>,
    pub pattern: Option<String>,
    pub props: FieldProps,
}

impl BoolMatcher {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<BoolMatcher> {
        let mut value = None;
        let mut pattern = None;
        if let Some(m) = node.get(KEY_MATCHES) {
            match m {
                Value::Bool(b) => value = Some(*b),
                Value::Str(s) => pattern = Some(s.clone()),
                _ => return Err(malformed_err(KEY_MATCHES, TYPE_BOOL, parent)),
            }
        }
        Ok(BoolMatcher {
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
            Value::Bool(b) => *b,
            other => return Ok(MatchOutcome::fail(mismatched_err(TYPE_BOOL, other))),
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
            } else {
                match resolved.parse::<bool>() {
                    Ok(expected) if expected == actual => MatchOutcome::pass(actual.to_string()),
                    Ok(expected) => MatchOutcome::fail(value_err(expected, actual)),
                    Err(_) => MatchOutcome::fail(pattern_err(actual, &resolved)),
                }
            }
        } else {
            MatchOutcome::pass(actual.to_string())
        };

        Ok(outcome.with_capture(&self.props, value))
    }
}
