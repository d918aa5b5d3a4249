//! Object matcher

use indexmap::IndexMap;

use crate::common::Result;
use crate::store::DataStore;
use crate::value::Value;

use super::{
    check_existence, malformed_err, mismatched_err, Existence, FieldProps, MatchOutcome,
    KEY_PROPERTIES, KEY_SORTED, TYPE_BOOL, TYPE_OBJ,
};

/// Asserts that a node is a mapping. The interesting work happens in the
/// child matchers the schema loader derives from `properties`; a passing
/// object assertion is suppressed from the report.
#[derive(Debug, Clone)]
pub struct ObjectMatcher {
    pub properties: Option<IndexMap<String, Value>>,
    pub sorted: bool,
    pub props: FieldProps,
}

impl ObjectMatcher {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<ObjectMatcher> {
        let properties = match node.get(KEY_PROPERTIES) {
            Some(Value::Map(m)) => Some(m.clone()),
            Some(_) => return Err(malformed_err(KEY_PROPERTIES, TYPE_OBJ, parent)),
            None => None,
        };

        let sorted = match node.get(KEY_SORTED) {
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(malformed_err(KEY_SORTED, TYPE_BOOL, parent)),
            None => true,
        };

        Ok(ObjectMatcher {
            properties,
            sorted,
            props: FieldProps::parse(parent, node)?,
        })
    }

    pub fn evaluate(&self, value: &Value, _store: &DataStore) -> Result<MatchOutcome> {
        match check_existence(value, self.props.exists, self.props.nullable) {
            Existence::Fail(msg) => return Ok(MatchOutcome::fail(msg)),
            Existence::PassAndSkip => return Ok(MatchOutcome::pass("")),
            Existence::Evaluate => {}
        }

        match value {
            Value::Map(_) => Ok(MatchOutcome::pass("{}").with_capture(&self.props, value)),
            other => Ok(MatchOutcome::fail(mismatched_err(TYPE_OBJ, other))),
        }
    }
}
