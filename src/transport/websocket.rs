//! WebSocket transport
//!
//! A suite holds one session per resolved route so servers can keep
//! session state across cases. Each case drives a list of messages; every
//! response read is appended to the payload's `responses` sequence.

use std::io::Cursor;
use std::path::Path;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::common::{Error, Result};
use crate::template::command::run_command_bytes;
use crate::value::Value;

use super::binary::{base64_gzip_decode, summarize};

// message body kinds
const MSG_TEXT: &str = "text";
const MSG_JSON: &str = "json";
const MSG_BINARY: &str = "binary";

// binary payload encodings
const ENC_BASE64_GZIP: &str = "base64gzip";
const ENC_HEX: &str = "hex";
const ENC_FILE: &str = "file";
const ENC_EXTERNAL: &str = "external";

/// One message exchange within a WebSocket case.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WsMessage {
    pub payload: serde_json::Value,
    /// Arguments for the `external` encoding's generator program.
    pub args: Vec<String>,
    #[serde(rename = "writeOnly", alias = "WriteOnly")]
    pub write_only: bool,
    #[serde(rename = "readOnly")]
    pub read_only: bool,
    /// Expected response kind: `json` (default), `text`, or `binary`.
    pub response: String,
    /// Message body kind: `text`, `json` (default), or `binary`.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Binary payload encoding; defaults to `base64gzip`.
    pub encoding: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

/// The resolved input tree of a WebSocket case.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WsInput {
    pub requests: Vec<WsMessage>,
    /// Tear the session down after this case.
    pub close: bool,
}

impl WsInput {
    pub fn from_value(input: &Value) -> Result<WsInput> {
        serde_json::from_value(input.to_json())
            .map_err(|e| Error::Transport(format!("failed to read websocket input: {}", e)))
    }
}

/// A connected session, reused across the cases of one suite.
pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsSession {
    pub async fn connect(url: &str, headers: &[(String, String)]) -> Result<WsSession> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Transport(format!("invalid websocket route '{}': {}", url, e)))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::Transport(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::Transport(format!("invalid header value for '{}'", name)))?;
            request.headers_mut().insert(name, value);
        }

        debug!(url, "starting websocket client");
        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::Transport(format!("failed to start websocket client: {}", e)))?;
        Ok(WsSession { stream })
    }

    /// Drive every message of the case, returning one response entry per
    /// read.
    pub async fn execute(&mut self, input: &WsInput) -> Result<Vec<Value>> {
        let mut responses = Vec::new();
        for message in &input.requests {
            if !message.read_only {
                self.write_message(message).await?;
            }
            if !message.write_only {
                responses.push(self.read_message(message).await?);
            }
        }
        Ok(responses)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.stream.send(Message::Close(None)).await.ok();
        self.stream.close(None).await.ok();
        Ok(())
    }

    async fn write_message(&mut self, message: &WsMessage) -> Result<()> {
        match message.message_type.as_str() {
            MSG_BINARY => {
                let bytes = decode_binary_payload(message)?;
                self.stream.send(Message::Binary(bytes)).await?;
            }
            MSG_TEXT | MSG_JSON | "" => {
                let text = match &message.payload {
                    serde_json::Value::String(s) => s.clone(),
                    other => serde_json::to_string(other)?,
                };
                self.stream.send(Message::Text(text)).await?;
            }
            other => {
                return Err(Error::Transport(format!(
                    "unknown websocket message type '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    async fn read_message(&mut self, message: &WsMessage) -> Result<Value> {
        let received = self
            .stream
            .next()
            .await
            .ok_or_else(|| Error::Transport("websocket closed before response".to_string()))?
            .map_err(|e| Error::Transport(format!("failed to read websocket response: {}", e)))?;

        let bytes = match received {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(_) => {
                return Err(Error::Transport(
                    "websocket closed before response".to_string(),
                ))
            }
            other => {
                return Err(Error::Transport(format!(
                    "unexpected websocket frame: {:?}",
                    other
                )))
            }
        };

        let file_path =
            (!message.file_path.is_empty()).then(|| Path::new(message.file_path.as_str()));
        match message.response.as_str() {
            MSG_BINARY => summarize(Cursor::new(bytes), file_path, true),
            MSG_TEXT => {
                let mut map = indexmap::IndexMap::new();
                map.insert(
                    "payload".to_string(),
                    Value::Str(String::from_utf8_lossy(&bytes).into_owned()),
                );
                Ok(Value::Map(map))
            }
            _ => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(parsed) => Ok(Value::from(parsed)),
                // non-JSON data where JSON was expected: summarize instead
                Err(_) => summarize(Cursor::new(bytes), None, false),
            },
        }
    }
}

fn decode_binary_payload(message: &WsMessage) -> Result<Vec<u8>> {
    let encoding = if message.encoding.is_empty() {
        ENC_BASE64_GZIP
    } else {
        message.encoding.as_str()
    };

    match encoding {
        ENC_BASE64_GZIP => {
            let text = payload_str(message, "base64 gzip")?;
            base64_gzip_decode(text)
        }
        ENC_HEX => {
            let text = payload_str(message, "hex string")?;
            hex::decode(text.trim())
                .map_err(|_| Error::Transport("websocket payload is not valid hex".to_string()))
        }
        ENC_FILE => {
            let path = payload_str(message, "file path")?;
            std::fs::read(path).map_err(|e| {
                Error::Transport(format!(
                    "failed to open file '{}' to send via websocket: {}",
                    path, e
                ))
            })
        }
        ENC_EXTERNAL => {
            let program = payload_str(message, "program path")?;
            run_command_bytes(program, &message.args)
        }
        other => Err(Error::Transport(format!(
            "unknown websocket payload encoding '{}'",
            other
        ))),
    }
}

fn payload_str<'a>(message: &'a WsMessage, expected: &str) -> Result<&'a str> {
    message.payload.as_str().ok_or_else(|| {
        Error::Transport(format!(
            "websocket payload expected to be a {} - found non-string value instead",
            expected
        ))
    })
}
