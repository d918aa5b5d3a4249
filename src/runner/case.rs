//! Test case driver
//!
//! One case drives one transport call (WebSocket cases may drive several
//! messages): resolve the declared input through the template pipeline,
//! dispatch, then run the status, payload, and header matcher lists
//! against what came back. Captures reach the suite store only when the
//! whole case passes.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use serde::Deserialize;
use tracing::debug;

use crate::common::{Error, Result};
use crate::matcher::{FieldResult, MatcherPath, ResponseMatcher};
use crate::store::DataStore;
use crate::transport::rest::{do_rest, RestBody};
use crate::transport::rpc::do_rpc;
use crate::transport::websocket::{WsInput, WsSession};
use crate::transport::{ParserRegistry, RESPONSE_TYPE_BINARY, RESPONSE_TYPE_HTML, RESPONSE_TYPE_JSON};
use crate::value::path::PathKey;
use crate::value::Value;

pub const STATUS_PATH: &str = "status";
pub const HEADERS_PATH: &str = "headers";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RpcCfg {
    pub protocol: String,
    pub address: String,
    pub procedure: String,
}

impl RpcCfg {
    fn is_configured(&self) -> bool {
        !self.protocol.is_empty() && !self.address.is_empty() && !self.procedure.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseCfg {
    /// Either a literal status code or a full matcher definition.
    pub code: Option<serde_yaml::Value>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Where binary responses are saved.
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    pub payload: Option<serde_yaml::Value>,
    pub headers: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TestCaseCfg {
    pub name: String,
    pub description: String,
    /// Stop the suite when this case is reached.
    pub exit: bool,
    pub skip: bool,
    pub input: Option<serde_yaml::Value>,
    #[serde(rename = "formInput")]
    pub form_input: bool,
    pub tags: Vec<String>,
    pub headers: Option<serde_yaml::Value>,
    pub route: String,
    pub method: String,
    pub websocket: bool,
    pub rpc: RpcCfg,
    pub response: ResponseCfg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Rest,
    Rpc,
    WebSocket,
}

/// A loaded case: immutable config plus the three matcher lists built at
/// suite load.
pub struct TestCase {
    pub cfg: TestCaseCfg,
    pub kind: CaseKind,
    /// Display method: the HTTP verb, `RPC`, or `WS`.
    pub method: String,
    /// Unresolved route in display form.
    pub route: String,
    pub response_type: String,
    input: Value,
    headers: Value,
    status_matcher: ResponseMatcher,
    payload_matcher: ResponseMatcher,
    header_matcher: ResponseMatcher,
    tags: HashSet<String>,
}

/// The result bundle of one executed case.
#[derive(Debug, Default)]
pub struct CaseResult {
    pub name: String,
    pub description: String,
    pub method: String,
    pub route: String,
    pub resolved_route: String,
    pub passed: bool,
    pub skipped: bool,
    pub fields: Vec<FieldResult>,
    pub status_code: Option<u16>,
    pub response: Value,
    pub response_headers: Value,
    pub request_headers: Vec<(String, String)>,
    pub input: Value,
    /// The case declared header matchers; the report echoes response
    /// headers when set.
    pub validates_headers: bool,
    pub started: Option<SystemTime>,
    pub duration: Duration,
}

impl TestCase {
    pub fn load(cfg: TestCaseCfg) -> Result<TestCase> {
        let response_type = match cfg.response.kind.as_deref() {
            None | Some("") => RESPONSE_TYPE_JSON.to_string(),
            Some(t @ (RESPONSE_TYPE_JSON | RESPONSE_TYPE_BINARY | RESPONSE_TYPE_HTML)) => {
                t.to_string()
            }
            Some(other) => {
                return Err(Error::Config(format!(
                    "Invalid 'response.type' specified for {}: {}",
                    cfg.name, other
                )))
            }
        };

        let (kind, method, route) = if cfg.rpc.is_configured() {
            (
                CaseKind::Rpc,
                "RPC".to_string(),
                format!(
                    "{}://{}#{}",
                    cfg.rpc.protocol, cfg.rpc.address, cfg.rpc.procedure
                ),
            )
        } else if cfg.websocket {
            (CaseKind::WebSocket, "WS".to_string(), cfg.route.clone())
        } else {
            let method = if cfg.method.is_empty() {
                "GET".to_string()
            } else {
                cfg.method.clone()
            };
            (CaseKind::Rest, method, cfg.route.clone())
        };

        let mut status_matcher = ResponseMatcher::new();
        if let Some(code) = &cfg.response.code {
            status_matcher.load(
                &Value::from(code.clone()),
                MatcherPath::single(PathKey::Field("code".to_string())),
            )?;
        }

        let mut payload_matcher = ResponseMatcher::new();
        if let Some(payload) = &cfg.response.payload {
            payload_matcher.load(&Value::from(payload.clone()), MatcherPath::root())?;
        }

        let mut header_matcher = ResponseMatcher::new();
        if let Some(headers) = &cfg.response.headers {
            header_matcher.load(&Value::from(headers.clone()), MatcherPath::root())?;
        }

        let input = cfg
            .input
            .clone()
            .map(Value::from)
            .unwrap_or(Value::Null);
        let headers = cfg
            .headers
            .clone()
            .map(Value::from)
            .unwrap_or(Value::Null);
        let tags = cfg.tags.iter().cloned().collect();

        Ok(TestCase {
            kind,
            method,
            route,
            response_type,
            input,
            headers,
            status_matcher,
            payload_matcher,
            header_matcher,
            tags,
            cfg,
        })
    }

    /// A tag argument is an OR-list of comma-separated entries; a leading
    /// `!` matches when the case lacks the tag.
    pub fn has_tag(&self, tag_list: &str) -> bool {
        for entry in tag_list.split(',') {
            let entry = entry.trim();
            let (negated, tag) = match entry.strip_prefix('!') {
                Some(tag) => (true, tag),
                None => (false, entry),
            };
            if self.tags.contains(tag) != negated {
                return true;
            }
        }
        false
    }

    /// Skipped unless every tag argument matches.
    pub fn skip_on_tags(&self, filters: &[String]) -> bool {
        filters.iter().any(|f| !self.has_tag(f))
    }

    pub async fn execute(
        &self,
        store: &mut DataStore,
        ws: &mut Option<WsSession>,
        client: &reqwest::Client,
        registry: &ParserRegistry,
        tag_filters: &[String],
    ) -> CaseResult {
        let started = SystemTime::now();
        let timer = Instant::now();
        let mut result = CaseResult {
            name: self.cfg.name.clone(),
            description: self.cfg.description.clone(),
            method: self.method.clone(),
            route: self.route.clone(),
            validates_headers: !self.header_matcher.is_empty(),
            started: Some(started),
            ..CaseResult::default()
        };

        if self.cfg.skip {
            result.passed = true;
            result.skipped = true;
            result.fields.push(FieldResult::synthetic_pass(
                "test.skip",
                "Skipping test as configured",
            ));
            result.duration = timer.elapsed();
            return result;
        }

        if !tag_filters.is_empty() && self.skip_on_tags(tag_filters) {
            result.passed = true;
            result.skipped = true;
            result.fields.push(FieldResult::synthetic_pass(
                "test.tags",
                format!(
                    "Skipping test - no tags matching the combination of: {:?}",
                    tag_filters
                ),
            ));
            result.duration = timer.elapsed();
            return result;
        }

        debug!(name = %self.cfg.name, "executing test case");
        if let Err(e) = self.run(store, ws, client, registry, &mut result).await {
            result.passed = false;
            result
                .fields
                .push(FieldResult::synthetic_failure("test.Error", e.to_string()));
        }

        result.duration = timer.elapsed();
        result
    }

    async fn run(
        &self,
        store: &mut DataStore,
        ws: &mut Option<WsSession>,
        client: &reqwest::Client,
        registry: &ParserRegistry,
        result: &mut CaseResult,
    ) -> Result<()> {
        let input = store.recursive_resolve(self.input.clone())?;
        result.input = input.clone();

        let resolved_route = store
            .expand_variable(&self.route)?
            .to_text_or(&self.route);
        result.resolved_route = resolved_route.clone();

        let headers = self.resolved_headers(store)?;

        match self.kind {
            CaseKind::Rest => {
                let body = if self.cfg.form_input {
                    match input {
                        Value::Map(fields) => RestBody::Form(fields),
                        Value::Null => RestBody::Form(Default::default()),
                        _ => {
                            return Err(Error::Config(
                                "form input requires the test input to be an object".to_string(),
                            ))
                        }
                    }
                } else if input.is_null() {
                    RestBody::None
                } else {
                    RestBody::Json(input)
                };

                let file_path = self.cfg.response.file_path.as_deref().map(Path::new);
                let outcome = do_rest(
                    client,
                    &self.method,
                    &resolved_route,
                    &headers,
                    body,
                    &self.response_type,
                    file_path,
                    registry,
                )
                .await?;

                result.status_code = Some(outcome.status);
                result.request_headers = outcome.request_headers;
                result.response_headers = outcome.headers.clone();
                result.response = outcome.payload.clone();

                self.validate_rest(store, outcome.status, &outcome.payload, &outcome.headers, result)
            }
            CaseKind::Rpc => {
                let payload = do_rpc(
                    &self.cfg.rpc.protocol,
                    &self.cfg.rpc.address,
                    &self.cfg.rpc.procedure,
                    &input,
                )
                .await?;
                result.response = payload.clone();
                self.validate_payload_only(store, &payload, result)
            }
            CaseKind::WebSocket => {
                let ws_input = WsInput::from_value(&input)?;

                if ws.is_none() {
                    *ws = Some(WsSession::connect(&resolved_route, &headers).await?);
                }
                let session = ws.as_mut().expect("session just ensured");
                let exchange = session.execute(&ws_input).await;

                if ws_input.close {
                    if let Some(mut session) = ws.take() {
                        session.close().await.ok();
                    }
                }

                let responses = exchange?;
                let mut payload = indexmap::IndexMap::new();
                payload.insert("responses".to_string(), Value::Seq(responses));
                let payload = Value::Map(payload);
                result.response = payload.clone();
                self.validate_payload_only(store, &payload, result)
            }
        }
    }

    fn resolved_headers(&self, store: &DataStore) -> Result<Vec<(String, String)>> {
        let resolved = store.recursive_resolve(self.headers.clone())?;
        match resolved {
            Value::Null => Ok(Vec::new()),
            Value::Map(map) => Ok(map
                .into_iter()
                .map(|(name, value)| (name, value.to_text()))
                .collect()),
            _ => Err(Error::Config(
                "failed to load headers for test - expected an object".to_string(),
            )),
        }
    }

    /// REST validation order: status, payload, headers. Captures from all
    /// three lists commit together iff all three pass.
    fn validate_rest(
        &self,
        store: &mut DataStore,
        status: u16,
        payload: &Value,
        headers: &Value,
        result: &mut CaseResult,
    ) -> Result<()> {
        let mut status_tree = indexmap::IndexMap::new();
        status_tree.insert("code".to_string(), Value::Int(status as i64));
        let status_out = self
            .status_matcher
            .evaluate(&Value::Map(status_tree), store)?;
        for field in status_out.results {
            result.fields.push(FieldResult {
                path: STATUS_PATH.to_string() + field.path.as_str(),
                ..field
            });
        }

        let payload_out = self.payload_matcher.evaluate(payload, store)?;
        result.fields.extend(payload_out.results);

        let header_out = self.header_matcher.evaluate(headers, store)?;
        for field in header_out.results {
            result.fields.push(FieldResult {
                path: HEADERS_PATH.to_string() + field.path.as_str(),
                ..field
            });
        }

        result.passed = status_out.passed && payload_out.passed && header_out.passed;
        if result.passed {
            for (name, value) in status_out
                .captures
                .into_iter()
                .chain(payload_out.captures)
                .chain(header_out.captures)
            {
                store.put(&name, value)?;
            }
        }
        Ok(())
    }

    fn validate_payload_only(
        &self,
        store: &mut DataStore,
        payload: &Value,
        result: &mut CaseResult,
    ) -> Result<()> {
        let payload_out = self.payload_matcher.evaluate(payload, store)?;
        result.fields.extend(payload_out.results);
        result.passed = payload_out.passed;
        if result.passed {
            for (name, value) in payload_out.captures {
                store.put(&name, value)?;
            }
        }
        Ok(())
    }
}
