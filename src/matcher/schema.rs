//! Schema loading
//!
//! Turns a payload description subtree into an ordered list of matcher
//! configurations. Full-form mappings carry a `type` key; everything else
//! takes the short form: scalars become literal matchers, sequences become
//! not-empty arrays, mappings become objects that recurse into their
//! properties. Property keys starting with `$.` are compact JSON paths and
//! materialize the nested matcher tree the explicit long form would have
//! produced.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::common::{Error, Result};
use crate::value::path::{parse_path, render_path, PathKey};
use crate::value::{object_printf, Value};

use super::{
    ArrayMatcher, BoolMatcher, ExecMatcher, FieldProps, FloatMatcher, IntegerMatcher, Matcher,
    ObjectMatcher, StringMatcher, ANY, KEY_TYPE, NOT_EMPTY, TYPE_ARRAY, TYPE_BOOL, TYPE_EXEC,
    TYPE_INT, TYPE_NUM, TYPE_OBJ, TYPE_STR,
};

/// Where a matcher sits relative to the response root, plus the traversal
/// flags inherited from enclosing arrays.
#[derive(Debug, Clone, Default)]
pub struct MatcherPath {
    pub keys: Vec<PathKey>,
    /// The path passes through an array item definition.
    pub is_array_element: bool,
    /// Inherited ordering of the nearest enclosing array; unsorted paths
    /// resolve indices by searching.
    pub sorted: bool,
}

impl MatcherPath {
    pub fn root() -> MatcherPath {
        MatcherPath {
            keys: Vec::new(),
            is_array_element: false,
            sorted: true,
        }
    }

    pub fn single(key: PathKey) -> MatcherPath {
        MatcherPath {
            keys: vec![key],
            is_array_element: false,
            sorted: true,
        }
    }

    /// Extend with one key, inheriting flags.
    pub fn child(&self, key: PathKey) -> MatcherPath {
        let mut keys = self.keys.clone();
        keys.push(key);
        MatcherPath {
            keys,
            is_array_element: self.is_array_element,
            sorted: self.sorted,
        }
    }

    pub fn render(&self) -> String {
        render_path(&self.keys)
    }

    pub fn parent_render(&self) -> String {
        let len = self.keys.len().saturating_sub(1);
        render_path(&self.keys[..len])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One matcher bound to its location in the response.
#[derive(Debug, Clone)]
pub struct FieldMatcherConfig {
    pub matcher: Matcher,
    pub path: MatcherPath,
}

/// An ordered set of matchers over one response tree (payload, headers, or
/// status). Built once at suite load; evaluation lives in
/// [`super::evaluate`].
#[derive(Debug, Clone, Default)]
pub struct ResponseMatcher {
    pub configs: Vec<FieldMatcherConfig>,
    seen_paths: HashSet<String>,
}

impl ResponseMatcher {
    pub fn new() -> ResponseMatcher {
        ResponseMatcher::default()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Load a definition subtree at `path`, accepting both the full form
    /// (a mapping with a `type` key) and the short form.
    pub fn load(&mut self, node: &Value, path: MatcherPath) -> Result<()> {
        match node {
            Value::Map(map) => match map.get(KEY_TYPE) {
                Some(Value::Str(type_name)) => {
                    self.load_full(node, map, type_name.clone().as_str(), path)
                }
                Some(other) => Err(Error::MalformedMatcher(object_printf(
                    &format!(
                        "Expected '{}' to be a type name string, found '{}'",
                        KEY_TYPE,
                        other.type_name()
                    ),
                    node,
                ))),
                None => {
                    // short-form mapping: an object whose values are
                    // themselves definitions
                    let matcher = ObjectMatcher {
                        properties: Some(map.clone()),
                        sorted: true,
                        props: FieldProps::default(),
                    };
                    self.push(Matcher::Object(matcher), path.clone());
                    self.load_object_properties(map, &path)
                }
            },
            Value::Seq(seq) => {
                let matcher = ArrayMatcher {
                    length: None,
                    length_expr: Some(NOT_EMPTY.to_string()),
                    items: seq.clone(),
                    sorted: true,
                    props: FieldProps {
                        nullable: true,
                        ..FieldProps::default()
                    },
                };
                let items = matcher.items.clone();
                let sorted = matcher.sorted;
                self.push(Matcher::Array(matcher), path.clone());
                self.load_array_items(&items, sorted, &path)
            }
            Value::Int(i) => {
                let matcher = IntegerMatcher {
                    value: Some(*i),
                    pattern: None,
                    props: FieldProps::default(),
                };
                self.push(Matcher::Int(matcher), path);
                Ok(())
            }
            Value::Float(f) => {
                let matcher = FloatMatcher {
                    value: Some(*f),
                    pattern: None,
                    props: FieldProps::default(),
                };
                self.push(Matcher::Float(matcher), path);
                Ok(())
            }
            Value::Bool(b) => {
                let matcher = BoolMatcher {
                    value: Some(*b),
                    pattern: None,
                    props: FieldProps::default(),
                };
                self.push(Matcher::Bool(matcher), path);
                Ok(())
            }
            Value::Str(s) => {
                let matcher = StringMatcher {
                    value: Some(s.clone()),
                    props: FieldProps::default(),
                };
                self.push(Matcher::Str(matcher), path);
                Ok(())
            }
            Value::Null => Ok(()),
        }
    }

    fn load_full(
        &mut self,
        node: &Value,
        map: &IndexMap<String, Value>,
        type_name: &str,
        path: MatcherPath,
    ) -> Result<()> {
        match type_name {
            TYPE_INT => {
                let matcher = IntegerMatcher::parse(node, map)?;
                self.push(Matcher::Int(matcher), path);
            }
            TYPE_NUM => {
                let matcher = FloatMatcher::parse(node, map)?;
                self.push(Matcher::Float(matcher), path);
            }
            TYPE_BOOL => {
                let matcher = BoolMatcher::parse(node, map)?;
                self.push(Matcher::Bool(matcher), path);
            }
            TYPE_STR => {
                let matcher = StringMatcher::parse(node, map)?;
                self.push(Matcher::Str(matcher), path);
            }
            TYPE_ARRAY => {
                let matcher = ArrayMatcher::parse(node, map)?;
                let items = matcher.items.clone();
                let sorted = matcher.sorted;
                self.push(Matcher::Array(matcher), path.clone());
                self.load_array_items(&items, sorted, &path)?;
            }
            TYPE_OBJ => {
                let matcher = ObjectMatcher::parse(node, map)?;
                let properties = matcher.properties.clone();
                self.push(Matcher::Object(matcher), path.clone());
                if let Some(properties) = &properties {
                    self.load_object_properties(properties, &path)?;
                }
            }
            TYPE_EXEC => {
                let matcher = ExecMatcher::parse(node, map)?;
                self.push(Matcher::Exec(matcher), path);
            }
            unknown => {
                return Err(Error::MalformedMatcher(object_printf(
                    &format!("No matcher available for type '{}'", unknown),
                    node,
                )))
            }
        }
        Ok(())
    }

    /// Array item definitions generate child configs with an index suffix,
    /// inheriting the array's ordering.
    fn load_array_items(
        &mut self,
        items: &[Value],
        sorted: bool,
        path: &MatcherPath,
    ) -> Result<()> {
        for (index, item) in items.iter().enumerate() {
            let mut child = path.child(PathKey::Index(index));
            child.is_array_element = true;
            child.sorted = sorted;
            self.load(item, child)?;
        }
        Ok(())
    }

    fn load_object_properties(
        &mut self,
        fields: &IndexMap<String, Value>,
        path: &MatcherPath,
    ) -> Result<()> {
        for (key, definition) in fields {
            if let Some(compact) = key.strip_prefix("$.") {
                self.load_compact_path(compact, definition, path)?;
            } else {
                self.load(definition, path.child(PathKey::Field(key.clone())))?;
            }
        }
        Ok(())
    }

    /// A `$.a.b[0].c` property key explodes into path keys; the nested
    /// container matchers the long form would have declared are
    /// materialized along the way.
    fn load_compact_path(
        &mut self,
        compact: &str,
        definition: &Value,
        path: &MatcherPath,
    ) -> Result<()> {
        let exploded = parse_path(compact)?;

        for depth in 1..exploded.len() {
            let next = &exploded[depth];
            let mut keys = path.keys.clone();
            keys.extend_from_slice(&exploded[..depth]);
            let prefix = MatcherPath {
                is_array_element: path.is_array_element
                    || keys.iter().any(PathKey::is_index),
                sorted: path.sorted,
                keys,
            };

            if next.is_index() {
                let matcher = ArrayMatcher {
                    length: None,
                    length_expr: Some(ANY.to_string()),
                    items: Vec::new(),
                    sorted: true,
                    props: FieldProps {
                        nullable: true,
                        ..FieldProps::default()
                    },
                };
                self.push(Matcher::Array(matcher), prefix);
            } else {
                let matcher = ObjectMatcher {
                    properties: None,
                    sorted: true,
                    props: FieldProps::default(),
                };
                self.push(Matcher::Object(matcher), prefix);
            }
        }

        let mut keys = path.keys.clone();
        keys.extend_from_slice(&exploded);
        let leaf = MatcherPath {
            is_array_element: path.is_array_element || keys.iter().any(PathKey::is_index),
            sorted: path.sorted,
            keys,
        };
        self.load(definition, leaf)
    }

    /// Insert unless this path was already claimed; the first insertion
    /// wins so an explicit shorter path cannot silently override a more
    /// specific entry.
    fn push(&mut self, matcher: Matcher, path: MatcherPath) {
        let rendered = path.render();
        if !self.seen_paths.insert(rendered) {
            return;
        }
        self.configs.push(FieldMatcherConfig { matcher, path });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_payload(yaml: &str) -> ResponseMatcher {
        let node = Value::from_yaml_str(yaml).unwrap();
        let mut rm = ResponseMatcher::new();
        rm.load(&node, MatcherPath::root()).unwrap();
        rm
    }

    fn paths(rm: &ResponseMatcher) -> Vec<String> {
        rm.configs.iter().map(|c| c.path.render()).collect()
    }

    #[test]
    fn test_full_form_integer() {
        let rm = load_payload("page:\n  type: integer\n  matches: 2\n");
        assert!(paths(&rm).contains(&".page".to_string()));
        let config = rm
            .configs
            .iter()
            .find(|c| c.path.render() == ".page")
            .unwrap();
        assert!(matches!(config.matcher, Matcher::Int(_)));
    }

    #[test]
    fn test_short_form_scalar() {
        let rm = load_payload("page: 2\nname: demo\nflag: true\n");
        let config = rm
            .configs
            .iter()
            .find(|c| c.path.render() == ".page")
            .unwrap();
        match &config.matcher {
            Matcher::Int(m) => assert_eq!(m.value, Some(2)),
            other => panic!("expected integer matcher, got {:?}", other),
        }
    }

    #[test]
    fn test_short_form_sequence_becomes_not_empty_array() {
        let rm = load_payload("items:\n  - 1\n  - 2\n");
        let config = rm
            .configs
            .iter()
            .find(|c| c.path.render() == ".items")
            .unwrap();
        match &config.matcher {
            Matcher::Array(m) => assert_eq!(m.length_expr.as_deref(), Some(NOT_EMPTY)),
            other => panic!("expected array matcher, got {:?}", other),
        }
        // item definitions become indexed children
        assert!(paths(&rm).contains(&".items[0]".to_string()));
        assert!(paths(&rm).contains(&".items[1]".to_string()));
    }

    #[test]
    fn test_array_items_inherit_sorted_flag() {
        let rm = load_payload(
            "data:\n  type: array\n  length: $notEmpty\n  sorted: false\n  items:\n    - type: object\n      properties:\n        id:\n          type: integer\n          matches: $any\n",
        );
        let item = rm
            .configs
            .iter()
            .find(|c| c.path.render() == ".data[0]")
            .unwrap();
        assert!(!item.path.sorted);
        assert!(item.path.is_array_element);
        let leaf = rm
            .configs
            .iter()
            .find(|c| c.path.render() == ".data[0].id")
            .unwrap();
        assert!(!leaf.path.sorted);
    }

    #[test]
    fn test_compact_json_path_key() {
        let rm = load_payload("\"$.a.b[0].c\":\n  type: integer\n  matches: 1\n");
        let rendered = paths(&rm);
        // the materialized container chain plus the leaf
        assert!(rendered.contains(&".a".to_string()));
        assert!(rendered.contains(&".a.b".to_string()));
        assert!(rendered.contains(&".a.b[0]".to_string()));
        assert!(rendered.contains(&".a.b[0].c".to_string()));

        let array = rm
            .configs
            .iter()
            .find(|c| c.path.render() == ".a.b")
            .unwrap();
        assert!(matches!(array.matcher, Matcher::Array(_)));
    }

    #[test]
    fn test_duplicate_paths_first_insertion_wins() {
        let mut rm = ResponseMatcher::new();
        let node = Value::from_yaml_str("a:\n  type: integer\n  matches: 1\n").unwrap();
        rm.load(&node, MatcherPath::root()).unwrap();
        let node2 = Value::from_yaml_str("a:\n  type: string\n  matches: $any\n").unwrap();
        rm.load(&node2, MatcherPath::root()).unwrap();

        let matching: Vec<_> = rm
            .configs
            .iter()
            .filter(|c| c.path.render() == ".a")
            .collect();
        assert_eq!(matching.len(), 1);
        assert!(matches!(matching[0].matcher, Matcher::Int(_)));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let node = Value::from_yaml_str("a:\n  type: quantum\n").unwrap();
        let mut rm = ResponseMatcher::new();
        let err = rm.load(&node, MatcherPath::root()).unwrap_err();
        assert!(matches!(err, Error::MalformedMatcher(_)));
    }

    #[test]
    fn test_status_code_short_form() {
        let mut rm = ResponseMatcher::new();
        rm.load(
            &Value::Int(200),
            MatcherPath::single(PathKey::Field("code".into())),
        )
        .unwrap();
        assert_eq!(rm.len(), 1);
        assert_eq!(rm.configs[0].path.render(), ".code");
    }
}
