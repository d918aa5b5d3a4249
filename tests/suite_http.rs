//! Suite-level tests against an in-process HTTP stub
//!
//! A minimal TCP server answers canned JSON so the full pipeline can run:
//! suite loading, template resolution, the REST transport, matcher
//! evaluation, and capture flow between cases.

use std::io::Write;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use apiprobe::runner::TestSuite;
use apiprobe::value::Value;

/// Serve canned JSON per request path until the listener is dropped.
async fn start_stub() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut request = Vec::new();
                loop {
                    let Ok(n) = socket.read(&mut buf).await else {
                        return;
                    };
                    if n == 0 {
                        return;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let request_line = String::from_utf8_lossy(&request);
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();

                let body = match path.as_str() {
                    "/users" => {
                        r#"{"data":[{"email":"x@y","id":1},{"email":"a@b","id":42}]}"#.to_string()
                    }
                    "/users/42" => r#"{"id":42,"active":true}"#.to_string(),
                    "/missing" => r#"{"error":"not found"}"#.to_string(),
                    other => format!(r#"{{"error":"no stub for {}"}}"#, other),
                };
                let status = if path == "/missing" { "404 Not Found" } else { "200 OK" };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    addr
}

fn write_suite(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn captures_flow_between_cases() {
    let addr = start_stub().await;

    let suite_yaml = format!(
        r#"
tests:
  - name: find user
    description: select the expected account from an unsorted listing
    route: "http://{addr}/users"
    method: GET
    response:
      code: 200
      payload:
        data:
          type: array
          length: $notEmpty
          sorted: false
          items:
            - type: object
              properties:
                email:
                  priority: 0
                  type: string
                  matches: "a@b"
                id:
                  priority: 1
                  type: integer
                  matches: $any
                  storeAs: "uid"
  - name: fetch user
    description: use the captured id in the route
    route: "http://{addr}/users/@{{uid}}"
    method: GET
    response:
      code: 200
      payload:
        id:
          type: integer
          matches: "@{{uid}}"
        active:
          type: bool
          matches: true
"#,
        addr = addr
    );

    let file = write_suite(&suite_yaml);
    let mut suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
    let result = suite.execute(&[]).await;

    assert_eq!(result.total, 2);
    assert_eq!(result.failed, 0, "results: {:#?}", result.results);
    assert_eq!(suite.store.get("uid").unwrap(), Value::Int(42));
    assert_eq!(
        result.results[1].resolved_route,
        format!("http://{}/users/42", addr)
    );
}

#[tokio::test]
async fn failed_case_commits_no_captures() {
    let addr = start_stub().await;

    let suite_yaml = format!(
        r#"
tests:
  - name: failing capture
    route: "http://{addr}/users/42"
    method: GET
    response:
      code: 200
      payload:
        id:
          type: integer
          matches: $any
          storeAs: "stored_id"
        active:
          type: bool
          matches: false
"#,
        addr = addr
    );

    let file = write_suite(&suite_yaml);
    let mut suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
    let result = suite.execute(&[]).await;

    assert_eq!(result.failed, 1);
    assert!(
        suite.store.get("stored_id").is_err(),
        "captures must not commit when the case fails"
    );
}

#[tokio::test]
async fn status_code_mismatch_fails_case() {
    let addr = start_stub().await;

    let suite_yaml = format!(
        r#"
tests:
  - name: wrong status
    route: "http://{addr}/missing"
    method: GET
    response:
      code: 200
"#,
        addr = addr
    );

    let file = write_suite(&suite_yaml);
    let mut suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
    let result = suite.execute(&[]).await;

    assert_eq!(result.failed, 1);
    let field = result.results[0]
        .fields
        .iter()
        .find(|f| f.path == "status.code")
        .unwrap();
    assert!(!field.status);
    assert!(field.error.contains("404"), "got: {}", field.error);
}

#[tokio::test]
async fn response_headers_are_validated() {
    let addr = start_stub().await;

    let suite_yaml = format!(
        r#"
tests:
  - name: header check
    route: "http://{addr}/users/42"
    method: GET
    response:
      code: 200
      headers:
        content-type:
          type: array
          length: 1
          items:
            - type: string
              matches: "application/json"
"#,
        addr = addr
    );

    let file = write_suite(&suite_yaml);
    let mut suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
    let result = suite.execute(&[]).await;
    assert_eq!(result.failed, 0, "results: {:#?}", result.results);

    let header_field = result.results[0]
        .fields
        .iter()
        .find(|f| f.path.starts_with("headers"))
        .unwrap();
    assert!(header_field.status);
}

#[tokio::test]
async fn unreachable_route_fails_without_aborting_suite() {
    let addr = start_stub().await;

    let suite_yaml = format!(
        r#"
tests:
  - name: dead endpoint
    route: "http://127.0.0.1:1/nothing"
    method: GET
    response:
      code: 200
  - name: live endpoint
    route: "http://{addr}/users/42"
    method: GET
    response:
      code: 200
"#,
        addr = addr
    );

    let file = write_suite(&suite_yaml);
    let mut suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
    let result = suite.execute(&[]).await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.passed, 1);
    let dead = &result.results[0];
    assert!(dead.fields.iter().any(|f| f.path == "test.Error"));
}

#[tokio::test]
async fn fixtures_and_vars_reach_the_route() {
    let addr = start_stub().await;

    let mut fixtures = tempfile::NamedTempFile::new().unwrap();
    fixtures
        .write_all(format!("ApiHost: \"http://{}\"\n", addr).as_bytes())
        .unwrap();

    let suite_yaml = r#"
tests:
  - name: fixture-driven route
    route: "@{ApiHost}/users/@{TargetUser}"
    method: GET
    response:
      code: 200
      payload:
        id:
          type: integer
          matches: 42
"#;

    let file = write_suite(suite_yaml);
    let mut suite = TestSuite::load(
        file.path(),
        Some(fixtures.path()),
        &[("TargetUser".to_string(), "42".to_string())],
    )
    .unwrap()
    .unwrap();
    let result = suite.execute(&[]).await;
    assert_eq!(result.failed, 0, "results: {:#?}", result.results);
}
