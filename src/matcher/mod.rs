//! Declarative matchers over response trees
//!
//! A matcher is one assertion against a sub-value of a response. Variants
//! cover the scalar types, arrays, objects, and external program checks.
//! Matchers are parsed once at suite load and stay immutable; evaluation
//! produces [`MatchOutcome`] records instead of mutating matcher state.

pub mod array;
pub mod boolean;
pub mod evaluate;
pub mod exec;
pub mod float;
pub mod integer;
pub mod object;
pub mod schema;
pub mod string;

use indexmap::IndexMap;

use crate::common::{Error, Result};
use crate::store::DataStore;
use crate::value::{object_printf, Value};

pub use array::ArrayMatcher;
pub use boolean::BoolMatcher;
pub use evaluate::{EvalOutput, FieldResult};
pub use exec::ExecMatcher;
pub use float::FloatMatcher;
pub use integer::IntegerMatcher;
pub use object::ObjectMatcher;
pub use schema::{FieldMatcherConfig, MatcherPath, ResponseMatcher};
pub use string::StringMatcher;

// Pattern sentinels
pub const ANY: &str = "$any";
pub const NOT_EMPTY: &str = "$notEmpty";

// Reserved matcher mapping keys
pub const KEY_TYPE: &str = "type";
pub const KEY_MATCHES: &str = "matches";
pub const KEY_PROPERTIES: &str = "properties";
pub const KEY_LENGTH: &str = "length";
pub const KEY_ITEMS: &str = "items";
pub const KEY_SORTED: &str = "sorted";
pub const KEY_STORE_AS: &str = "storeAs";
pub const KEY_PRIORITY: &str = "priority";
pub const KEY_EXISTS: &str = "exists";
pub const KEY_RETURNS: &str = "returns";
pub const KEY_BIN: &str = "bin";
pub const KEY_ARGS: &str = "args";
pub const KEY_CMD: &str = "cmd";

// Matcher type names
pub const TYPE_INT: &str = "integer";
pub const TYPE_NUM: &str = "number";
pub const TYPE_STR: &str = "string";
pub const TYPE_BOOL: &str = "bool";
pub const TYPE_ARRAY: &str = "array";
pub const TYPE_OBJ: &str = "object";
pub const TYPE_EXEC: &str = "external";

/// Matchers without an explicit priority run last.
pub const DEFAULT_PRIORITY: i64 = 9999;

pub const RECEIVED_NULL_ERR: &str = "Received null value when non-null value was expected";
pub const EXPECTED_NULL_ERR: &str = "Expected null value when non-null value was returned";

pub fn value_err(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> String {
    format!(
        "Expected value '{}' did not match the actual value '{}'",
        expected, actual
    )
}

pub fn pattern_err(actual: impl std::fmt::Display, pattern: &str) -> String {
    format!(
        "Failed to match actual value '{}' with expected pattern: '{}'",
        actual, pattern
    )
}

pub fn not_empty_err(actual: &str) -> String {
    format!("Expected non-empty value, but got value '{}' instead.", actual)
}

pub fn array_length_err(sign: &str, expected: i64, actual: i64) -> String {
    format!(
        "Expected array with length {} {} but found length {} instead.",
        sign, expected, actual
    )
}

pub fn mismatched_err(expected: &str, value: &Value) -> String {
    format!(
        "Expected a '{}' value but found '{}' instead",
        expected,
        value.type_name()
    )
}

pub fn malformed_err(key: &str, expected_type: &str, parent: &Value) -> Error {
    Error::MalformedMatcher(object_printf(
        &format!("Expected '{}' to be of type '{}'", key, expected_type),
        parent,
    ))
}

pub fn bad_var_err(expr: &str) -> Error {
    Error::BadVariable(format!("failed to resolve variable within matcher: {}", expr))
}

/// Properties shared by every matcher variant.
#[derive(Debug, Clone)]
pub struct FieldProps {
    /// The addressed value must exist (default) or must be absent.
    pub exists: bool,
    /// Null is tolerated even when `exists` is set; arrays turn this on.
    pub nullable: bool,
    /// Capture name; the matched value is bound into the suite store under
    /// this path when the enclosing case passes.
    pub store_as: Option<String>,
    /// Smaller runs earlier.
    pub priority: i64,
}

impl Default for FieldProps {
    fn default() -> Self {
        FieldProps {
            exists: true,
            nullable: false,
            store_as: None,
            priority: DEFAULT_PRIORITY,
        }
    }
}

impl FieldProps {
    pub fn parse(parent: &Value, node: &IndexMap<String, Value>) -> Result<FieldProps> {
        let mut props = FieldProps::default();

        if let Some(v) = node.get(KEY_EXISTS) {
            props.exists = match v {
                Value::Bool(b) => *b,
                Value::Str(s) => s
                    .parse::<bool>()
                    .map_err(|_| malformed_err(KEY_EXISTS, TYPE_BOOL, parent))?,
                _ => return Err(malformed_err(KEY_EXISTS, TYPE_BOOL, parent)),
            };
        }

        if let Some(v) = node.get(KEY_STORE_AS) {
            props.store_as = match v {
                Value::Str(s) => Some(s.clone()),
                _ => return Err(malformed_err(KEY_STORE_AS, TYPE_STR, parent)),
            };
        }

        if let Some(v) = node.get(KEY_PRIORITY) {
            props.priority = v
                .as_i64()
                .ok_or_else(|| malformed_err(KEY_PRIORITY, TYPE_INT, parent))?;
        }

        Ok(props)
    }
}

/// Result of the existence check that precedes every evaluation.
pub enum Existence {
    /// Presence requirement violated; the field fails with this message.
    Fail(&'static str),
    /// Absent and allowed to be absent; the field passes, skip evaluation.
    PassAndSkip,
    /// Present; continue to evaluate.
    Evaluate,
}

pub fn check_existence(value: &Value, exists: bool, nullable: bool) -> Existence {
    if value.is_null() && exists && !nullable {
        Existence::Fail(RECEIVED_NULL_ERR)
    } else if value.is_null() && !exists {
        Existence::PassAndSkip
    } else if !value.is_null() && !exists {
        Existence::Fail(EXPECTED_NULL_ERR)
    } else {
        Existence::Evaluate
    }
}

/// Evaluate a `$<`/`$<=`/`$>`/`$>=` expression against an integer.
/// `None` when the string is not a numeric expression at all.
pub fn evaluate_num_expr(expr: &str, actual: i64) -> Option<(bool, String)> {
    // longest operators first so $>= is not read as $>
    for (op, sign) in [("$>=", ">="), ("$<=", "<="), ("$>", ">"), ("$<", "<")] {
        let Some(rest) = expr.strip_prefix(op) else {
            continue;
        };
        let Ok(operand) = rest.trim().parse::<i64>() else {
            return Some((
                false,
                format!("Invalid numeric expression operand in '{}'", expr),
            ));
        };
        let status = match sign {
            ">=" => actual >= operand,
            "<=" => actual <= operand,
            ">" => actual > operand,
            _ => actual < operand,
        };
        let message = if status {
            String::new()
        } else {
            format!(
                "Expected a result evaluating to: {} {} but got {}",
                sign, operand, actual
            )
        };
        return Some((status, message));
    }
    None
}

/// Unanchored regular-expression match, like the source language's default.
pub fn match_pattern(pattern: &str, text: &str) -> Result<bool> {
    let re = regex::Regex::new(pattern)
        .map_err(|e| Error::MalformedMatcher(format!("invalid pattern '{}': {}", pattern, e)))?;
    Ok(re.is_match(text))
}

/// The outcome of evaluating one matcher against one value.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub status: bool,
    pub message: String,
    /// Pending `storeAs` captures, committed only when the case passes.
    pub captures: Vec<(String, Value)>,
}

impl MatchOutcome {
    pub fn pass(message: impl Into<String>) -> MatchOutcome {
        MatchOutcome {
            status: true,
            message: message.into(),
            captures: Vec::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> MatchOutcome {
        MatchOutcome {
            status: false,
            message: message.into(),
            captures: Vec::new(),
        }
    }

    pub fn with_capture(mut self, props: &FieldProps, value: &Value) -> MatchOutcome {
        if self.status {
            if let Some(name) = &props.store_as {
                self.captures.push((name.clone(), value.clone()));
            }
        }
        self
    }
}

/// One assertion over a sub-value of the response tree.
#[derive(Debug, Clone)]
pub enum Matcher {
    Int(IntegerMatcher),
    Float(FloatMatcher),
    Bool(BoolMatcher),
    Str(StringMatcher),
    Array(ArrayMatcher),
    Object(ObjectMatcher),
    Exec(ExecMatcher),
}

impl Matcher {
    pub fn props(&self) -> &FieldProps {
        match self {
            Matcher::Int(m) => &m.props,
            Matcher::Float(m) => &m.props,
            Matcher::Bool(m) => &m.props,
            Matcher::Str(m) => &m.props,
            Matcher::Array(m) => &m.props,
            Matcher::Object(m) => &m.props,
            Matcher::Exec(m) => &m.props,
        }
    }

    pub fn priority(&self) -> i64 {
        self.props().priority
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Matcher::Object(_))
    }

    pub fn evaluate(&self, value: &Value, store: &DataStore) -> Result<MatchOutcome> {
        match self {
            Matcher::Int(m) => m.evaluate(value, store),
            Matcher::Float(m) => m.evaluate(value, store),
            Matcher::Bool(m) => m.evaluate(value, store),
            Matcher::Str(m) => m.evaluate(value, store),
            Matcher::Array(m) => m.evaluate(value, store),
            Matcher::Object(m) => m.evaluate(value, store),
            Matcher::Exec(m) => m.evaluate(value, store),
        }
    }

    /// The message recorded when an unsorted-array search finds no node.
    pub fn locate_failure(&self) -> String {
        match self {
            Matcher::Str(m) => match &m.value {
                Some(v) => format!("Failed to locate node (matching '{}')", v),
                None => String::from("Failed to locate node"),
            },
            _ => String::from("Failed to locate node"),
        }
    }
}
