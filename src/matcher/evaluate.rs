//! Matcher evaluation
//!
//! Walks a response tree and applies the configured matchers in priority
//! order. Sorted arrays are indexed directly; unsorted arrays resolve
//! through a depth-first search whose selections are cached so sibling
//! matchers land on the same element. Object matchers inside unsorted
//! arrays are deferred until their children have selected the element.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::common::{Error, Result};
use crate::store::DataStore;
use crate::value::path::render_path;
use crate::value::Value;

use super::schema::{FieldMatcherConfig, ResponseMatcher};
use super::Matcher;

/// The reported outcome for one matcher.
#[derive(Debug, Clone)]
pub struct FieldResult {
    /// Display form of the matcher's path.
    pub path: String,
    pub status: bool,
    pub error: String,
    /// Render the message in the extended report section.
    pub show_extended: bool,
    /// Suppress from the report; successful object-root assertions are
    /// implicit.
    pub ignore: bool,
}

impl FieldResult {
    pub fn synthetic_failure(path: impl Into<String>, error: impl Into<String>) -> FieldResult {
        FieldResult {
            path: path.into(),
            status: false,
            error: error.into(),
            show_extended: true,
            ignore: false,
        }
    }

    pub fn synthetic_pass(path: impl Into<String>, error: impl Into<String>) -> FieldResult {
        FieldResult {
            path: path.into(),
            status: true,
            error: error.into(),
            show_extended: false,
            ignore: false,
        }
    }
}

/// Everything one evaluation produced.
#[derive(Debug, Default)]
pub struct EvalOutput {
    pub passed: bool,
    pub results: Vec<FieldResult>,
    /// Pending `storeAs` captures; the driver commits them to the suite
    /// store only when the whole case passes.
    pub captures: Vec<(String, Value)>,
}

/// A node selected by a previous matcher, keyed by rendered path prefix.
/// `key_index` is the number of path keys consumed when resuming from the
/// cached node.
struct CacheEntry {
    node: Value,
    key_index: usize,
}

struct DfsHit {
    node: Value,
    parent: Value,
}

impl ResponseMatcher {
    /// Evaluate every configured matcher against `response`.
    pub fn evaluate(&self, response: &Value, store: &DataStore) -> Result<EvalOutput> {
        let mut output = EvalOutput {
            passed: true,
            ..EvalOutput::default()
        };
        if self.configs.is_empty() {
            return Ok(output);
        }

        // a configured matcher list against nothing is one synthetic failure
        if response.is_empty_payload() {
            output.passed = false;
            output.results.push(FieldResult {
                path: "response".to_string(),
                status: false,
                error: "Expected a non-null response payload.".to_string(),
                show_extended: false,
                ignore: false,
            });
            return Ok(output);
        }

        // priority first, then path length so parents run before children
        let mut order: Vec<usize> = (0..self.configs.len()).collect();
        order.sort_by_key(|&i| (self.configs[i].matcher.priority(), self.configs[i].path.len()));

        let mut queue: VecDeque<usize> = order.into();
        let mut deferred: HashSet<usize> = HashSet::new();
        let mut cache: HashMap<String, CacheEntry> = HashMap::new();

        while let Some(index) = queue.pop_front() {
            let config = &self.configs[index];

            // an object matcher inside an unsorted array cannot pick its
            // element; its more specific children select it first
            if config.matcher.is_object()
                && config.path.is_array_element
                && !config.path.sorted
                && !deferred.contains(&index)
            {
                deferred.insert(index);
                queue.push_back(index);
                continue;
            }

            let (node, dfs_failed) = self.walk(config, response, store, &mut cache)?;

            let mut outcome = config.matcher.evaluate(&node, store)?;
            if dfs_failed && !outcome.status {
                outcome.message = config.matcher.locate_failure();
            }

            output.captures.append(&mut outcome.captures);
            output.passed = output.passed && outcome.status;
            output.results.push(FieldResult {
                path: config.path.render(),
                status: outcome.status,
                error: outcome.message,
                show_extended: false,
                ignore: config.matcher.is_object() && outcome.status,
            });
        }

        Ok(output)
    }

    /// Resolve the node a matcher applies to, consulting and feeding the
    /// selection cache.
    fn walk(
        &self,
        config: &FieldMatcherConfig,
        response: &Value,
        store: &DataStore,
        cache: &mut HashMap<String, CacheEntry>,
    ) -> Result<(Value, bool)> {
        let keys = &config.path.keys;

        // probe for the longest known prefix
        let mut node = response.clone();
        let mut start = 0usize;
        for depth in (1..=keys.len()).rev() {
            let prefix = render_path(&keys[..depth]);
            if let Some(entry) = cache.get(&prefix) {
                node = entry.node.clone();
                start = entry.key_index;
                break;
            }
        }

        let mut dfs_failed = false;
        let mut key_index = start;
        while key_index < keys.len() {
            let key = &keys[key_index];
            match &node {
                Value::Map(map) => {
                    node = map.get(&key.map_key()).cloned().unwrap_or(Value::Null);
                }
                Value::Seq(seq) => {
                    if config.path.sorted {
                        let index = key
                            .as_index()
                            .or_else(|| key.name().and_then(|n| n.parse().ok()))
                            .ok_or_else(|| Error::BadIndex(config.path.render()))?;
                        node = seq.get(index).cloned().unwrap_or(Value::Null);
                    } else {
                        let last = key_index == keys.len() - 1;
                        if key.is_index() && !last {
                            // the element is not bound yet; a later,
                            // more specific key performs the search
                            key_index += 1;
                            continue;
                        }
                        let target = if last && key.is_index() {
                            None
                        } else {
                            key.name()
                        };
                        match depth_match(&node, &config.matcher, store, target, None, None) {
                            Some(hit) => {
                                cache.insert(
                                    render_path(&keys[..key_index]),
                                    CacheEntry {
                                        node: hit.parent,
                                        key_index,
                                    },
                                );
                                cache.insert(
                                    render_path(&keys[..=key_index]),
                                    CacheEntry {
                                        node: hit.node.clone(),
                                        key_index: key_index + 1,
                                    },
                                );
                                node = hit.node;
                            }
                            None => {
                                dfs_failed = true;
                                node = Value::Null;
                            }
                        }
                    }
                }
                // a scalar where the path expects a container: the
                // mismatch surfaces from the matcher itself
                _ => break,
            }
            key_index += 1;
        }

        Ok((node, dfs_failed))
    }
}

/// Depth-first search for the first descendant the matcher accepts.
///
/// When the containing edge of a candidate is an object property, the
/// property name must equal the target key; this keeps a permissive
/// matcher from latching onto the first structurally compatible node
/// anywhere in the subtree.
fn depth_match(
    node: &Value,
    matcher: &Matcher,
    store: &DataStore,
    target: Option<&str>,
    nearest_edge: Option<&str>,
    parent: Option<&Value>,
) -> Option<DfsHit> {
    let accepted = matcher
        .evaluate(node, store)
        .map(|outcome| outcome.status)
        .unwrap_or(false);
    if accepted && (target.is_none() || nearest_edge == target) {
        return Some(DfsHit {
            node: node.clone(),
            parent: parent.cloned().unwrap_or(Value::Null),
        });
    }

    match node {
        Value::Map(map) => {
            for (key, value) in map {
                if let Some(hit) =
                    depth_match(value, matcher, store, target, Some(key.as_str()), Some(node))
                {
                    return Some(hit);
                }
            }
        }
        Value::Seq(seq) => {
            for value in seq {
                if let Some(hit) =
                    depth_match(value, matcher, store, target, nearest_edge, Some(node))
                {
                    return Some(hit);
                }
            }
        }
        _ => {}
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::schema::MatcherPath;

    fn matcher_for(yaml: &str) -> ResponseMatcher {
        let node = Value::from_yaml_str(yaml).unwrap();
        let mut rm = ResponseMatcher::new();
        rm.load(&node, MatcherPath::root()).unwrap();
        rm
    }

    fn eval(schema: &str, response: &str) -> EvalOutput {
        let rm = matcher_for(schema);
        let response = Value::from_json_str(response).unwrap();
        rm.evaluate(&response, &DataStore::new()).unwrap()
    }

    #[test]
    fn test_literal_match_passes() {
        let out = eval(
            "page:\n  type: integer\n  matches: 2\n",
            r#"{"page": 2}"#,
        );
        assert!(out.passed);
        let field = out.results.iter().find(|r| r.path == ".page").unwrap();
        assert!(field.status);
        assert_eq!(field.error, "2");
    }

    #[test]
    fn test_not_empty_string_failure() {
        let out = eval(
            "name:\n  type: string\n  matches: $notEmpty\n",
            r#"{"name": ""}"#,
        );
        assert!(!out.passed);
        let field = out.results.iter().find(|r| r.path == ".name").unwrap();
        assert!(field.error.starts_with("Expected non-empty value"));
    }

    #[test]
    fn test_empty_response_rule() {
        let out = eval("page:\n  type: integer\n  matches: 2\n", "{}");
        assert!(!out.passed);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].path, "response");
        assert_eq!(out.results[0].error, "Expected a non-null response payload.");
    }

    #[test]
    fn test_missing_field_reports_null() {
        let out = eval(
            "page:\n  type: integer\n  matches: 2\n",
            r#"{"other": 1}"#,
        );
        assert!(!out.passed);
        let field = out.results.iter().find(|r| r.path == ".page").unwrap();
        assert!(field.error.contains("null value"));
    }

    #[test]
    fn test_sorted_array_indexing() {
        let out = eval(
            "items:\n  type: array\n  length: 2\n  items:\n    - type: integer\n      matches: 10\n    - type: integer\n      matches: 20\n",
            r#"{"items": [10, 20]}"#,
        );
        assert!(out.passed);
    }

    #[test]
    fn test_unsorted_dfs_selects_by_specific_matcher() {
        let schema = "data:\n  type: array\n  length: $notEmpty\n  sorted: false\n  items:\n    - type: object\n      properties:\n        email:\n          priority: 0\n          type: string\n          matches: \"a@b\"\n        id:\n          priority: 1\n          type: integer\n          matches: $any\n          storeAs: uid\n";
        let out = eval(
            schema,
            r#"{"data":[{"email":"x@y","id":1},{"email":"a@b","id":42}]}"#,
        );
        assert!(out.passed, "results: {:?}", out.results);
        assert_eq!(
            out.captures,
            vec![("uid".to_string(), Value::Int(42))],
            "generic id matcher must follow the email selection"
        );
    }

    #[test]
    fn test_unsorted_dfs_failure_reports_locate_error() {
        let schema = "data:\n  type: array\n  length: $notEmpty\n  sorted: false\n  items:\n    - type: object\n      properties:\n        email:\n          type: string\n          matches: \"nobody@nowhere\"\n";
        let out = eval(schema, r#"{"data":[{"email":"a@b"}]}"#);
        assert!(!out.passed);
        let field = out
            .results
            .iter()
            .find(|r| r.path == ".data[0].email")
            .unwrap();
        assert!(field.error.contains("Failed to locate node"));
    }

    #[test]
    fn test_priority_orders_evaluation() {
        let rm = matcher_for(
            "a:\n  type: integer\n  matches: $any\n  priority: 5\nb:\n  type: integer\n  matches: $any\n  priority: 1\n",
        );
        let response = Value::from_json_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let out = rm.evaluate(&response, &DataStore::new()).unwrap();
        let order: Vec<&str> = out
            .results
            .iter()
            .map(|r| r.path.as_str())
            .filter(|p| *p == ".a" || *p == ".b")
            .collect();
        assert_eq!(order, vec![".b", ".a"]);
    }

    #[test]
    fn test_equal_priority_orders_by_path_length() {
        let rm = matcher_for(
            "outer:\n  type: object\n  properties:\n    inner:\n      type: integer\n      matches: 1\n",
        );
        let response = Value::from_json_str(r#"{"outer": {"inner": 1}}"#).unwrap();
        let out = rm.evaluate(&response, &DataStore::new()).unwrap();
        let outer_pos = out.results.iter().position(|r| r.path == ".outer").unwrap();
        let inner_pos = out
            .results
            .iter()
            .position(|r| r.path == ".outer.inner")
            .unwrap();
        assert!(outer_pos < inner_pos);
    }

    #[test]
    fn test_passing_object_results_are_ignored() {
        let out = eval(
            "outer:\n  type: object\n  properties:\n    inner:\n      type: integer\n      matches: 1\n",
            r#"{"outer": {"inner": 1}}"#,
        );
        let object = out.results.iter().find(|r| r.path == ".outer").unwrap();
        assert!(object.ignore);
        let inner = out.results.iter().find(|r| r.path == ".outer.inner").unwrap();
        assert!(!inner.ignore);
    }

    #[test]
    fn test_deferred_object_matcher_lands_on_selected_element() {
        // the object matcher over the unsorted item must wait for the
        // email matcher to bind the element, then accept the same node
        let schema = "data:\n  type: array\n  length: $notEmpty\n  sorted: false\n  items:\n    - type: object\n      properties:\n        email:\n          priority: 0\n          type: string\n          matches: \"a@b\"\n";
        let out = eval(
            schema,
            r#"{"data":[5, {"email":"a@b"}]}"#,
        );
        assert!(out.passed, "results: {:?}", out.results);
    }

    #[test]
    fn test_path_extension_reuses_selected_element() {
        // property 7: once the email matcher picks an element, a matcher
        // whose path extends the selection must see the same element
        let schema = "data:\n  type: array\n  length: $notEmpty\n  sorted: false\n  items:\n    - type: object\n      properties:\n        email:\n          priority: 0\n          type: string\n          matches: \"a@b\"\n        meta:\n          priority: 1\n          type: object\n          properties:\n            tag:\n              type: string\n              matches: \"right\"\n";
        let out = eval(
            schema,
            r#"{"data":[{"email":"x@y","meta":{"tag":"wrong"}},{"email":"a@b","meta":{"tag":"right"}}]}"#,
        );
        assert!(out.passed, "results: {:?}", out.results);
    }

    #[test]
    fn test_captures_not_committed_by_evaluator() {
        let store = DataStore::new();
        let rm = matcher_for("id:\n  type: integer\n  matches: $any\n  storeAs: captured\n");
        let response = Value::from_json_str(r#"{"id": 9}"#).unwrap();
        let out = rm.evaluate(&response, &store).unwrap();
        assert_eq!(out.captures, vec![("captured".to_string(), Value::Int(9))]);
        assert!(store.get("captured").is_err());
    }
}
