//! Transports and response parsing
//!
//! Transports turn wire responses into value trees the matcher engine can
//! walk. Response bodies are decoded by type through a small registry:
//! `json` and `binary` are built in, `html` ships as the one bundled
//! extension, and embedders can register their own.

pub mod binary;
pub mod html;
pub mod rest;
pub mod rpc;
pub mod websocket;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::common::{Error, Result};
use crate::value::Value;

pub const RESPONSE_TYPE_JSON: &str = "json";
pub const RESPONSE_TYPE_BINARY: &str = "binary";
pub const RESPONSE_TYPE_HTML: &str = "html";

pub const MIME_JSON: &str = "application/json";
pub const MIME_TEXT: &str = "text/plain";

pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// An undecoded transport response.
#[derive(Debug, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header name/value pairs; names lowercased, repeats preserved.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn content_types(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(name, _)| name == HEADER_CONTENT_TYPE)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Headers as a mapping from name to the list of values, the shape the
    /// header matcher list runs against.
    pub fn headers_value(&self) -> Value {
        let mut map: IndexMap<String, Value> = IndexMap::new();
        for (name, value) in &self.headers {
            match map
                .entry(name.clone())
                .or_insert_with(|| Value::Seq(Vec::new()))
            {
                Value::Seq(values) => values.push(Value::Str(value.clone())),
                _ => unreachable!(),
            }
        }
        Value::Map(map)
    }
}

/// Decodes one response type into a value tree. `Ok(None)` signals the
/// body cannot be handled and the binary fallback should take over.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, raw: &RawResponse, file_path: Option<&Path>) -> Result<Option<Value>>;
}

/// Built-in parser for JSON (and JSON-in-text) bodies.
pub struct JsonParser;

impl ResponseParser for JsonParser {
    fn parse(&self, raw: &RawResponse, _file_path: Option<&Path>) -> Result<Option<Value>> {
        let decodable = raw
            .content_types()
            .iter()
            .any(|t| t.contains(MIME_JSON) || t.contains(MIME_TEXT));
        if !decodable || raw.body.is_empty() {
            // a non-JSON content type, or a content type with no body:
            // fall back to the binary representation
            return Ok(None);
        }

        let parsed: serde_json::Value = serde_json::from_slice(&raw.body).map_err(|e| {
            Error::Transport(format!("failed to decode JSON response: {}", e))
        })?;
        Ok(Some(Value::from(parsed)))
    }
}

/// Built-in parser that spills the body and summarizes it.
pub struct BinaryParser {
    /// Set when this parser runs because no other parser could handle the
    /// body; attaches the NOTICE lines to the summary.
    pub fallback: bool,
}

impl ResponseParser for BinaryParser {
    fn parse(&self, raw: &RawResponse, file_path: Option<&Path>) -> Result<Option<Value>> {
        binary::summarize(raw.body.as_slice(), file_path, !self.fallback).map(Some)
    }
}

/// Bundled extension: HTML documents as generic trees.
pub struct HtmlParser;

impl ResponseParser for HtmlParser {
    fn parse(&self, raw: &RawResponse, _file_path: Option<&Path>) -> Result<Option<Value>> {
        let body = String::from_utf8_lossy(&raw.body);
        Ok(Some(html::parse_html(&body)))
    }
}

/// Response parsers keyed by the suite's declared `response.type`.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn ResponseParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        ParserRegistry::with_defaults()
    }
}

impl ParserRegistry {
    pub fn with_defaults() -> ParserRegistry {
        let mut registry = ParserRegistry {
            parsers: HashMap::new(),
        };
        registry.register(RESPONSE_TYPE_JSON, Arc::new(JsonParser));
        registry.register(RESPONSE_TYPE_BINARY, Arc::new(BinaryParser { fallback: false }));
        registry.register(RESPONSE_TYPE_HTML, Arc::new(HtmlParser));
        registry
    }

    pub fn register(&mut self, response_type: &str, parser: Arc<dyn ResponseParser>) {
        self.parsers.insert(response_type.to_string(), parser);
    }

    pub fn parse_response(
        &self,
        response_type: &str,
        raw: &RawResponse,
        file_path: Option<&Path>,
    ) -> Result<Value> {
        let parser = self.parsers.get(response_type).ok_or_else(|| {
            Error::Config(format!(
                "No response parser defined for type \"{}\"",
                response_type
            ))
        })?;

        match parser.parse(raw, file_path)? {
            Some(value) => Ok(value),
            None => {
                // the binary parser is always available as the fallback
                // for unexpected body shapes
                let fallback = BinaryParser { fallback: true };
                fallback
                    .parse(raw, file_path)
                    .map(|v| v.unwrap_or(Value::Null))
            }
        }
    }
}
