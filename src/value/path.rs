//! Path grammar over the value tree
//!
//! Text form: `a.b[2].c`. Splitting honors string-literal quoting and
//! backslash escaping, so delimiters inside quotes are literal. Quoted
//! tokens are promoted: outer quotes stripped, nested escapes collapsed
//! one level.

use crate::common::{Error, Result};
use crate::template::tokens::{promote_quotes, split_tokens};

/// One element of a path into a [`crate::value::Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    /// Object property.
    Field(String),
    /// Non-negative array index.
    Index(usize),
    /// A field known to own a sequence (the following key is an index).
    /// Behaves exactly like `Field` on lookup.
    Array(String),
    /// A field carrying the `{}` hint: always materialized as an object.
    /// Behaves exactly like `Field` on lookup.
    Object(String),
}

impl PathKey {
    /// The property name used for mapping lookups. `None` for indices.
    pub fn name(&self) -> Option<&str> {
        match self {
            PathKey::Field(n) | PathKey::Array(n) | PathKey::Object(n) => Some(n),
            PathKey::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, PathKey::Index(_))
    }

    /// Mapping lookup key: property name, or the decimal form of an index
    /// (indices address mappings by their stringified form).
    pub fn map_key(&self) -> String {
        match self {
            PathKey::Index(i) => i.to_string(),
            other => other.name().unwrap_or_default().to_string(),
        }
    }
}

/// Parse the text form of a path into its keys.
///
/// Errors on an empty path, a bracket close without a matching open, and a
/// non-integer bracket token that is not a quoted string.
pub fn parse_path(input: &str) -> Result<Vec<PathKey>> {
    let mut keys = Vec::new();
    for token in split_tokens(input, ".") {
        parse_token(&token, input, &mut keys)?;
    }
    if keys.is_empty() {
        return Err(Error::MissingKey(input.to_string()));
    }
    Ok(keys)
}

/// Render keys back into text form: `.a.b[2].c`.
pub fn render_path(keys: &[PathKey]) -> String {
    let mut out = String::new();
    for key in keys {
        match key {
            PathKey::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
            other => {
                out.push('.');
                out.push_str(other.name().unwrap_or_default());
            }
        }
    }
    out
}

enum TokenPart {
    Text(String),
    Bracket(String),
}

fn parse_token(token: &str, full: &str, keys: &mut Vec<PathKey>) -> Result<()> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_bracket = false;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in token.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '"' | '\'' | '`' => {
                match quote {
                    Some(q) if q == c => quote = None,
                    None => quote = Some(c),
                    Some(_) => {}
                }
                current.push(c);
            }
            '[' if quote.is_none() => {
                if in_bracket {
                    return Err(Error::BadIndex(full.to_string()));
                }
                if !current.is_empty() {
                    parts.push(TokenPart::Text(std::mem::take(&mut current)));
                }
                in_bracket = true;
            }
            ']' if quote.is_none() => {
                if !in_bracket {
                    return Err(Error::BadIndex(full.to_string()));
                }
                parts.push(TokenPart::Bracket(std::mem::take(&mut current)));
                in_bracket = false;
            }
            _ => current.push(c),
        }
    }
    if in_bracket {
        return Err(Error::BadIndex(full.to_string()));
    }
    if !current.is_empty() {
        parts.push(TokenPart::Text(current));
    }

    for part in parts {
        match part {
            TokenPart::Text(text) => {
                let promoted = promote_quotes(vec![text])
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                if let Some(stripped) = strip_object_hint(&promoted) {
                    keys.push(PathKey::Object(stripped));
                } else {
                    keys.push(PathKey::Field(promoted));
                }
            }
            TokenPart::Bracket(text) => {
                let trimmed = text.trim();
                if let Ok(index) = trimmed.parse::<usize>() {
                    // the preceding field owns a sequence
                    if let Some(PathKey::Field(name)) = keys.last() {
                        let name = name.clone();
                        *keys.last_mut().unwrap() = PathKey::Array(name);
                    }
                    keys.push(PathKey::Index(index));
                } else if is_quoted(trimmed) {
                    let promoted = promote_quotes(vec![trimmed.to_string()])
                        .into_iter()
                        .next()
                        .unwrap_or_default();
                    keys.push(PathKey::Field(promoted));
                } else {
                    return Err(Error::BadIndex(full.to_string()));
                }
            }
        }
    }
    Ok(())
}

fn is_quoted(token: &str) -> bool {
    let mut chars = token.chars();
    let first = chars.next();
    let last = token.chars().last();
    token.len() >= 2
        && matches!(first, Some('"') | Some('\'') | Some('`'))
        && first == last
}

fn strip_object_hint(name: &str) -> Option<String> {
    name.contains("{}").then(|| name.replace("{}", ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_path() {
        let keys = parse_path("a.b.c").unwrap();
        assert_eq!(
            keys,
            vec![
                PathKey::Field("a".into()),
                PathKey::Field("b".into()),
                PathKey::Field("c".into())
            ]
        );
    }

    #[test]
    fn test_parse_indexed_path() {
        let keys = parse_path("data.items[2].name").unwrap();
        assert_eq!(
            keys,
            vec![
                PathKey::Field("data".into()),
                PathKey::Array("items".into()),
                PathKey::Index(2),
                PathKey::Field("name".into())
            ]
        );
    }

    #[test]
    fn test_parse_quoted_bracket_key() {
        let keys = parse_path("a[\"strange.key\"]").unwrap();
        assert_eq!(
            keys,
            vec![
                PathKey::Field("a".into()),
                PathKey::Field("strange.key".into())
            ]
        );
    }

    #[test]
    fn test_quoted_dotted_token_stays_whole() {
        let keys = parse_path("\"a.b\".c").unwrap();
        assert_eq!(
            keys,
            vec![PathKey::Field("a.b".into()), PathKey::Field("c".into())]
        );
    }

    #[test]
    fn test_object_hint() {
        let keys = parse_path("servers{}.name").unwrap();
        assert_eq!(
            keys,
            vec![
                PathKey::Object("servers".into()),
                PathKey::Field("name".into())
            ]
        );
    }

    #[test]
    fn test_unbalanced_brackets_error() {
        assert!(parse_path("a]b").is_err());
        assert!(parse_path("a[1").is_err());
    }

    #[test]
    fn test_unquoted_non_integer_index_errors() {
        assert!(parse_path("a[abc]").is_err());
    }

    #[test]
    fn test_render_round_trip() {
        for path in ["a.b.c", "data.items[2].name", "x[0][1]"] {
            let keys = parse_path(path).unwrap();
            let rendered = render_path(&keys);
            assert_eq!(parse_path(rendered.trim_start_matches('.')).unwrap(), keys);
        }
    }

    #[test]
    fn test_empty_path_errors() {
        assert!(parse_path("").is_err());
    }
}
