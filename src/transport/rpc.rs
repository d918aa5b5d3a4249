//! RPC transport
//!
//! JSON-RPC 2.0 framing over two carriers: HTTP POST, and a
//! newline-delimited exchange on a raw TCP stream. The resolved input
//! tree rides as `params` and the `result` member becomes the response
//! payload.

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::common::{Error, Result};
use crate::value::Value;

pub const RPC_PROTOCOL_TCP: &str = "tcp";
pub const RPC_PROTOCOL_HTTP: &str = "http";

pub async fn do_rpc(
    protocol: &str,
    address: &str,
    procedure: &str,
    args: &Value,
) -> Result<Value> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": procedure,
        "params": args.to_json(),
    });

    debug!(protocol, address, procedure, "dispatching RPC request");
    let response = match protocol {
        RPC_PROTOCOL_TCP => call_tcp(address, &request).await?,
        _ => call_http(address, &request).await?,
    };

    unwrap_rpc_response(response)
}

async fn call_http(address: &str, request: &serde_json::Value) -> Result<serde_json::Value> {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let client = reqwest::Client::new();
    let response = client
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| Error::Transport(format!("rpc call failed: {}", e)))?;

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| Error::Transport(format!("failed to decode rpc response: {}", e)))
}

async fn call_tcp(address: &str, request: &serde_json::Value) -> Result<serde_json::Value> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| Error::Transport(format!("failed to dial rpc endpoint: {}", e)))?;
    let (read_half, mut write_half) = stream.into_split();

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    write_half
        .write_all(line.as_bytes())
        .await
        .map_err(|e| Error::Transport(format!("rpc call failed: {}", e)))?;

    let mut reader = BufReader::new(read_half);
    let mut reply = String::new();
    reader
        .read_line(&mut reply)
        .await
        .map_err(|e| Error::Transport(format!("failed to read rpc response: {}", e)))?;

    serde_json::from_str(&reply)
        .map_err(|e| Error::Transport(format!("failed to decode rpc response: {}", e)))
}

fn unwrap_rpc_response(response: serde_json::Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        if !error.is_null() {
            return Err(Error::Transport(format!("rpc call returned error: {}", error)));
        }
    }
    match response.get("result") {
        Some(result) => Ok(Value::from(result.clone())),
        None => Ok(Value::from(response)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_result() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        let value = unwrap_rpc_response(response).unwrap();
        assert_eq!(value.get_field("ok"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_unwrap_error() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -1, "message": "no"}});
        assert!(unwrap_rpc_response(response).is_err());
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(request["method"], "Service.Echo");
            let reply = json!({"jsonrpc": "2.0", "id": 1, "result": {"echo": request["params"]}});
            let mut line = serde_json::to_string(&reply).unwrap();
            line.push('\n');
            socket.write_all(line.as_bytes()).await.unwrap();
        });

        let value = do_rpc(
            RPC_PROTOCOL_TCP,
            &addr.to_string(),
            "Service.Echo",
            &Value::from_json_str(r#"{"x": 1}"#).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(
            value.get_field("echo").unwrap().get_field("x"),
            Some(&Value::Int(1))
        );
    }
}
