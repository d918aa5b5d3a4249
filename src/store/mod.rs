//! The per-suite keyed data store
//!
//! A single mapping at the root of each suite holds fixtures, environment
//! variables, CLI overrides, and values captured from earlier responses.
//! Reads and writes are path-addressed; writes materialize missing
//! intermediate objects and arrays.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::common::{Error, Result};
use crate::template::command::execute_commands;
use crate::template::tokens::TokenStack;
use crate::value::path::{parse_path, PathKey};
use crate::value::Value;

pub const VAR_PREFIX: &str = "@{";
pub const VAR_SUFFIX: &str = "}";

/// True when the whole input is a single `@{…}` reference.
pub fn is_var(input: &str) -> bool {
    input.starts_with(VAR_PREFIX) && input.ends_with(VAR_SUFFIX)
}

/// Path-addressed storage for one suite.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    root: IndexMap<String, Value>,
}

impl DataStore {
    pub fn new() -> DataStore {
        DataStore::default()
    }

    /// Insert directly under a top-level key without path interpretation.
    /// Environment variable names may contain dots and brackets; seeding
    /// must not treat those as path syntax.
    pub fn put_raw(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    /// Write `value` at `path`, materializing intermediate containers.
    /// Out-of-range indices extend the sequence with nulls. Fails only
    /// when the path indexes an existing non-sequence scalar as an array.
    pub fn put(&mut self, path: &str, value: Value) -> Result<()> {
        let keys = parse_path(path)?;
        let (head, rest) = keys.split_first().expect("parse_path returned keys");

        // first level lives in the root map directly
        let name = head.map_key();
        if rest.is_empty() {
            self.root.insert(name, value);
            return Ok(());
        }
        let entry = self
            .root
            .entry(name)
            .or_insert_with(|| empty_container(&rest[0]));
        put_into(entry, rest, path, value)
    }

    /// Read the value at `path`.
    pub fn get(&self, path: &str) -> Result<Value> {
        let keys = parse_path(path)?;
        self.get_keys(&keys, path)
    }

    fn get_keys(&self, keys: &[PathKey], display: &str) -> Result<Value> {
        let (head, rest) = keys
            .split_first()
            .ok_or_else(|| Error::MissingKey(display.to_string()))?;
        let mut node = self
            .root
            .get(&head.map_key())
            .ok_or_else(|| Error::MissingKey(display.to_string()))?;

        for key in rest {
            node = match node {
                Value::Map(map) => map
                    .get(&key.map_key())
                    .ok_or_else(|| Error::MissingKey(display.to_string()))?,
                Value::Seq(seq) => {
                    let index = match key {
                        PathKey::Index(i) => *i,
                        other => other
                            .name()
                            .and_then(|n| n.parse::<usize>().ok())
                            .ok_or_else(|| Error::BadIndex(display.to_string()))?,
                    };
                    seq.get(index)
                        .ok_or_else(|| Error::IndexOutOfBounds(display.to_string()))?
                }
                _ => return Err(Error::MissingKey(display.to_string())),
            };
        }
        Ok(node.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.root.contains_key(key)
    }

    /// The root mapping as a value tree.
    pub fn root_value(&self) -> Value {
        Value::Map(self.root.clone())
    }

    /// Merge every top-level entry of `other` into this store.
    pub fn merge(&mut self, other: &DataStore) {
        for (k, v) in &other.root {
            self.root.insert(k.clone(), v.clone());
        }
    }

    /// Expand every `@{…}` region in `input`.
    ///
    /// Nested references resolve innermost-first and substitute textually
    /// into the regions that contain them. When the whole input is one
    /// reference the resolved value is returned with its type preserved;
    /// otherwise results are stringified into the surrounding text.
    pub fn expand_variable(&self, input: &str) -> Result<Value> {
        let mut seen = HashSet::new();
        self.expand_guarded(input, &mut seen)
    }

    fn expand_guarded(&self, input: &str, seen: &mut HashSet<String>) -> Result<Value> {
        let stack = TokenStack::parse(input, VAR_PREFIX, VAR_SUFFIX);
        if stack.frames.is_empty() {
            return Ok(Value::Str(input.to_string()));
        }

        // a single region spanning the whole input keeps its resolved type;
        // anything else collapses to string substitution
        let top_frames = stack.frames.iter().filter(|f| f.nest == 0).count();
        let input_chars = input.chars().count();
        let spans_all = top_frames == 1
            && stack.extra.is_empty()
            && stack
                .frames
                .iter()
                .any(|f| f.nest == 0 && f.start == 0 && f.end == input_chars - 1);

        let mut output = if spans_all {
            None
        } else {
            Some(input.to_string())
        };
        let mut result = Value::Null;

        let mut frames: Vec<(String, String)> = stack
            .frames
            .iter()
            .map(|f| (f.text.clone(), f.text.clone()))
            .collect();

        for i in 0..frames.len() {
            let (token, resolved_name) = frames[i].clone();
            // only resolve text that is still a reference; substituted
            // results of inner references must not resolve twice
            let resolved = if is_var(&resolved_name) {
                let inner: String = {
                    let chars: Vec<char> = resolved_name.chars().collect();
                    chars[VAR_PREFIX.chars().count()..chars.len() - VAR_SUFFIX.chars().count()]
                        .iter()
                        .collect()
                };
                let keys = parse_path(&inner)
                    .map_err(|_| Error::BadVariable(resolved_name.clone()))?;
                self.get_keys(&keys, &inner)?
            } else {
                Value::Null
            };

            if stack.frames[i].nest == 0 {
                match output.as_mut() {
                    Some(out) => *out = out.replace(&token, &resolved.to_text()),
                    None => result = resolved.clone(),
                }
            }

            for frame in frames.iter_mut().skip(i + 1) {
                if !frame.1.contains(&token) {
                    continue;
                }
                if !matches!(resolved, Value::Str(_)) {
                    return Err(Error::BadVariable(format!(
                        "cannot compose {}: {} does not resolve to a string",
                        frame.0, token
                    )));
                }
                frame.1 = frame.1.replace(&token, &resolved.to_text());
            }
        }

        if let Some(out) = output {
            return Ok(Value::Str(out));
        }

        // a whole-input reference may resolve to another reference string;
        // follow the chain, refusing cycles
        if let Value::Str(chained) = &result {
            if !TokenStack::parse(chained, VAR_PREFIX, VAR_SUFFIX)
                .frames
                .is_empty()
            {
                if chained == input || !seen.insert(input.to_string()) {
                    return Err(Error::BadVariable(input.to_string()));
                }
                if seen.contains(chained.as_str()) {
                    return Err(Error::BadVariable(chained.clone()));
                }
                return self.expand_guarded(chained, seen);
            }
        }

        Ok(result)
    }

    /// Apply variable expansion and subcommand execution to every string
    /// scalar in the tree, in one traversal. Mappings and sequences
    /// recurse in place.
    pub fn recursive_resolve(&self, input: Value) -> Result<Value> {
        match input {
            Value::Map(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, self.recursive_resolve(v)?);
                }
                Ok(Value::Map(out))
            }
            Value::Seq(seq) => {
                let mut out = Vec::with_capacity(seq.len());
                for item in seq {
                    out.push(self.recursive_resolve(item)?);
                }
                Ok(Value::Seq(out))
            }
            Value::Str(s) => {
                let expanded = self.expand_variable(&s)?;
                match expanded {
                    // commands run after expansion so they can reference
                    // expanded variables
                    Value::Str(text) => Ok(Value::Str(execute_commands(&text)?)),
                    other => crate::template::command::recursive_execute(other),
                }
            }
            other => Ok(other),
        }
    }
}

fn empty_container(next: &PathKey) -> Value {
    match next {
        PathKey::Index(_) => Value::Seq(Vec::new()),
        _ => Value::Map(IndexMap::new()),
    }
}

fn put_into(node: &mut Value, keys: &[PathKey], path: &str, value: Value) -> Result<()> {
    let (head, rest) = keys.split_first().expect("put_into called with keys");
    match node {
        Value::Map(map) => {
            let name = head.map_key();
            if rest.is_empty() {
                map.insert(name, value);
                return Ok(());
            }
            let entry = map
                .entry(name)
                .or_insert_with(|| empty_container(&rest[0]));
            put_into(entry, rest, path, value)
        }
        Value::Seq(seq) => {
            let index = match head {
                PathKey::Index(i) => *i,
                other => other
                    .name()
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| Error::BadIndex(path.to_string()))?,
            };
            if index >= seq.len() {
                seq.resize(index + 1, Value::Null);
            }
            if rest.is_empty() {
                seq[index] = value;
                return Ok(());
            }
            if seq[index].is_null() {
                seq[index] = empty_container(&rest[0]);
            }
            put_into(&mut seq[index], rest, path, value)
        }
        other => {
            // a scalar stands where the path needs a container
            if head.is_index() {
                return Err(Error::BadIndex(path.to_string()));
            }
            *other = Value::Map(IndexMap::new());
            put_into(other, keys, path, value)
        }
    }
}
