//! REST transport
//!
//! Issues one HTTP request per case. JSON bodies come from the resolved
//! input tree; `formInput` cases instead build a multipart form where
//! scalar fields become text parts and sequences of strings become file
//! parts read from disk.

use std::path::Path;

use indexmap::IndexMap;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::multipart;
use tracing::debug;

use crate::common::{Error, Result};
use crate::value::Value;

use super::{ParserRegistry, RawResponse};

/// Request body shapes.
pub enum RestBody {
    None,
    Json(Value),
    Form(IndexMap<String, Value>),
}

/// Everything a case needs back from one HTTP exchange.
pub struct RestOutcome {
    pub status: u16,
    /// Response headers as a name -> list-of-values tree.
    pub headers: Value,
    pub payload: Value,
    /// The headers actually sent, echoed in extended reports.
    pub request_headers: Vec<(String, String)>,
}

pub async fn do_rest(
    client: &reqwest::Client,
    method: &str,
    url: &str,
    headers: &[(String, String)],
    body: RestBody,
    response_type: &str,
    file_path: Option<&Path>,
    registry: &ParserRegistry,
) -> Result<RestOutcome> {
    let method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| Error::Transport(format!("invalid HTTP method '{}'", method)))?;

    let mut builder = client.request(method, url);
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::Transport(format!("invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Transport(format!("invalid header value for '{}'", name)))?;
        builder = builder.header(name, value);
    }

    builder = match body {
        RestBody::None => builder,
        RestBody::Json(input) => builder.json(&input.to_json()),
        RestBody::Form(fields) => builder.multipart(build_form(fields).await?),
    };

    let request = builder
        .build()
        .map_err(|e| Error::Transport(format!("failed to build request: {}", e)))?;
    let request_headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    debug!(url = %request.url(), "dispatching REST request");
    let response = client
        .execute(request)
        .await
        .map_err(|e| Error::Transport(format!("failed to fetch API response: {}", e)))?;

    let status = response.status().as_u16();
    let mut raw_headers = Vec::new();
    for name in response.headers().keys() {
        for value in response.headers().get_all(name) {
            raw_headers.push((
                name.as_str().to_lowercase(),
                value.to_str().unwrap_or_default().to_string(),
            ));
        }
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Transport(format!("failed to read API response: {}", e)))?;

    let raw = RawResponse {
        status,
        headers: raw_headers,
        body: body.to_vec(),
    };
    let payload = registry.parse_response(response_type, &raw, file_path)?;

    Ok(RestOutcome {
        status,
        headers: raw.headers_value(),
        payload,
        request_headers,
    })
}

/// Scalar fields become text parts; sequences of strings are file paths
/// uploaded as file parts, enabling multi-file upload under one field.
async fn build_form(fields: IndexMap<String, Value>) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for (key, value) in fields {
        match value {
            Value::Seq(paths) => {
                for entry in paths {
                    let path = entry.as_str().ok_or_else(|| {
                        Error::Transport(
                            "form file lists must contain string paths".to_string(),
                        )
                    })?;
                    let file_name = Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.to_string());
                    let bytes = tokio::fs::read(path).await.map_err(|e| {
                        Error::Transport(format!(
                            "failed to open file for form input '{}': {}",
                            path, e
                        ))
                    })?;
                    form = form.part(key.clone(), multipart::Part::bytes(bytes).file_name(file_name));
                }
            }
            other => {
                form = form.text(key.clone(), other.to_text());
            }
        }
    }
    Ok(form)
}
