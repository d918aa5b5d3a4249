//! String matcher

use indexmap::IndexMap;

use crate::common::Result;
use crate::store::DataStore;
use crate::value::Value;

use super::{
    bad_var_err, check_existence, malformed_err, match_pattern, mismatched_err, not_empty_err,
    pattern_err, Existence, FieldProps, MatchOutcome, ANY, KEY_MATCHES, NOT_EMPTY, TYPE_STR,
};

/// Matches a string by regular expression, `$any`, or `$notEmpty`.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    pub value: Option<String>,
    pub props: FieldProps,
}

impl StringMatcher {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<StringMatcher> {
        let mut value = None;
        if let Some(m) = node.get(KEY_MATCHES) {
            match m {
                Value::Str(s) => value = Some(s.clone()),
                _ => return Err(malformed_err(KEY_MATCHES, TYPE_STR, parent)),
            }
        }
        Ok(StringMatcher {
            value,
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
            Value::Str(s) => s.as_str(),
            other => return Ok(MatchOutcome::fail(mismatched_err(TYPE_STR, other))),
        };

        let outcome = if let Some(expected) = &self.value {
            let resolved = store
                .expand_variable(expected)
                .map_err(|_| bad_var_err(expected))?
                .to_text_or(expected);

            match resolved.as_str() {
                ANY => MatchOutcome::pass(actual),
                NOT_EMPTY => {
                    if actual.is_empty() {
                        MatchOutcome::fail(not_empty_err(actual))
                    } else {
                        MatchOutcome::pass(actual)
                    }
                }
                _ => {
                    if match_pattern(&resolved, actual)? {
                        MatchOutcome::pass(actual)
                    } else {
                        MatchOutcome::fail(pattern_err(actual, &resolved))
                    }
                }
            }
        } else {
            MatchOutcome::pass(actual)
        };

        Ok(outcome.with_capture(&self.props, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_matcher(yaml: &str) -> StringMatcher {
        let node = Value::from_yaml_str(yaml).unwrap();
        StringMatcher::parse(&node, node.as_map().unwrap()).unwrap()
    }

    #[test]
    fn test_regex_match() {
        let m = parse_matcher("matches: \"^abc\"");
        assert!(m
            .evaluate(&Value::Str("abcdef".into()), &DataStore::new())
            .unwrap()
            .status);
        assert!(!m
            .evaluate(&Value::Str("xabc".into()), &DataStore::new())
            .unwrap()
            .status);
    }

    #[test]
    fn test_not_empty() {
        let m = parse_matcher("matches: $notEmpty");
        let out = m
            .evaluate(&Value::Str(String::new()), &DataStore::new())
            .unwrap();
        assert!(!out.status);
        assert!(out.message.starts_with("Expected non-empty value"));
        assert!(m
            .evaluate(&Value::Str("x".into()), &DataStore::new())
            .unwrap()
            .status);
    }

    #[test]
    fn test_variable_expanded_pattern() {
        let mut store = DataStore::new();
        store.put_raw("expected", Value::Str("^demo$".into()));
        let m = parse_matcher("matches: \"@{expected}\"");
        assert!(m
            .evaluate(&Value::Str("demo".into()), &store)
            .unwrap()
            .status);
    }

    #[test]
    fn test_type_mismatch() {
        let m = parse_matcher("matches: $any");
        assert!(!m.evaluate(&Value::Int(1), &DataStore::new()).unwrap().status);
    }
}
