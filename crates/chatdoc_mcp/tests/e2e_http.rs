//! End-to-End tests for the HTTP surface
//!
//! Drives the real router with `tower::ServiceExt::oneshot` against a temp
//! directory root. No mocks: conversions write real files and the file
//! server reads them back.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chatdoc_mcp::{router, AppState, ServerConfig, Settings};
use chatdoc_render::testing::template_with_styles;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;

const BASE_URL: &str = "http://localhost:8080";

struct Reply {
    status: StatusCode,
    session: Option<String>,
    headers: axum::http::HeaderMap,
    body: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("single JSON response")
    }

    fn lines(&self) -> Vec<Value> {
        self.body
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

fn app_with(temp: &TempDir, settings: Settings) -> Router {
    let config = ServerConfig::new(Settings {
        allowed_root: Some(temp.path().to_path_buf()),
        ..settings
    })
    .unwrap();
    router(AppState::new(&config))
}

fn app(temp: &TempDir) -> Router {
    app_with(
        temp,
        Settings {
            use_http_links: true,
            http_base_url: Some(BASE_URL.into()),
            ..Settings::default()
        },
    )
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let session = headers
        .get("mcp-session-id")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        session,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

async fn post(app: &Router, body: String, session: Option<&str>) -> Reply {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = session {
        request = request.header("mcp-session-id", id);
    }
    send(app, request.body(Body::from(body)).unwrap()).await
}

async fn get(app: &Router, uri: &str) -> Reply {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

fn initialize(version: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": version,
            "capabilities": {},
            "clientInfo": {"name": "e2e", "version": "0.0.1"}
        }
    })
    .to_string()
}

fn call(id: i64, tool: &str, arguments: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": tool, "arguments": arguments}
    })
    .to_string()
}

async fn ready(app: &Router) -> String {
    let reply = post(app, initialize("2025-03-26"), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.session.expect("initialize issues a session id")
}

fn result_text(response: &Value) -> String {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("no text result in {}", response))
        .to_string()
}

/// The `/files/...` path from a tool result's link line
fn file_uri(text: &str) -> String {
    let link = text
        .lines()
        .find_map(|l| l.strip_prefix("**File Link:** "))
        .unwrap();
    link.strip_prefix(BASE_URL).unwrap().to_string()
}

// =============================================================================
// PROTOCOL BRIDGE
// =============================================================================

#[tokio::test]
async fn test_unsupported_version_then_call_before_initialize() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);

    let reply = post(&app, initialize("1999-01-01"), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.session.is_none());
    let response = reply.json();
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"]["code"], -32602);
    assert!(response["error"]["data"]["supported"].is_array());

    let reply = post(
        &app,
        call(2, "convert-contents", json!({"title": "x", "contents": "y"})),
        None,
    )
    .await;
    let response = reply.json();
    assert_eq!(response["id"], 2);
    assert_eq!(response["error"]["code"], -32002);
    assert_eq!(response["error"]["data"]["kind"], "not_initialized");
}

#[tokio::test]
async fn test_initialize_and_list_tools_with_session_header() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let session = ready(&app).await;

    let list = json!({"jsonrpc": "2.0", "id": "t", "method": "tools/list"}).to_string();
    let reply = post(&app, list, Some(&session)).await;
    let response = reply.json();
    assert_eq!(response["id"], "t");
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["convert-contents", "list-templates"]);
}

#[tokio::test]
async fn test_notifications_only_is_accepted() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    let reply = post(&app, body, None).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert!(reply.body.is_empty());
}

#[tokio::test]
async fn test_multiple_messages_in_one_body() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let body = [
        initialize("2024-11-05"),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}).to_string(),
    ]
    .join("\n");
    let reply = post(&app, body, None).await;
    let lines = reply.lines();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(lines[1]["id"], 2);
    assert!(lines[2]["result"]["tools"].is_array());
}

#[tokio::test]
async fn test_pretty_printed_initialize() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let body: Value = serde_json::from_str(&initialize("2025-06-18")).unwrap();
    let body = serde_json::to_string_pretty(&body).unwrap();
    assert!(body.lines().count() > 1);

    let reply = post(&app, body, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let session = reply.session.clone().expect("initialize issues a session id");
    assert_eq!(reply.json()["result"]["protocolVersion"], "2025-06-18");

    let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string();
    let response = post(&app, list, Some(&session)).await.json();
    assert!(response["result"]["tools"].is_array());
}

#[tokio::test]
async fn test_notification_method_with_id_is_answered() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let body = json!({"jsonrpc": "2.0", "id": 77, "method": "notifications/foo"}).to_string();
    let reply = post(&app, body, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let response = reply.json();
    assert_eq!(response["id"], 77);
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let temp = TempDir::new().unwrap();
    let app = app_with(
        &temp,
        Settings {
            max_request_bytes: Some(64),
            ..Settings::default()
        },
    );
    let reply = post(&app, initialize("2025-03-26"), None).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_delete_closes_session() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let session = ready(&app).await;

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/")
        .header("mcp-session-id", &session)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.status, StatusCode::NO_CONTENT);

    let list = json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"}).to_string();
    let response = post(&app, list, Some(&session)).await.json();
    assert_eq!(response["error"]["code"], -32002);
}

// =============================================================================
// CONVERSIONS
// =============================================================================

#[tokio::test]
async fn test_csv_round_trip_through_file_server() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let session = ready(&app).await;

    let args = json!({
        "title": "Formula Check",
        "contents": "| a | b |\n|---|---|\n|=1+1|x|",
        "output_format": "csv"
    });
    let response = post(&app, call(2, "convert-contents", args), Some(&session))
        .await
        .json();
    let text = result_text(&response);
    assert!(text.contains("formula_check_00.csv"));

    let file = get(&app, &file_uri(&text)).await;
    assert_eq!(file.status, StatusCode::OK);
    assert_eq!(file.body, "a,b\n\t=1+1,x\n");
    assert_eq!(
        file.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"formula_check_00.csv\""
    );
    assert_eq!(file.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(file.headers[header::CONTENT_TYPE], "text/csv");
}

#[tokio::test]
async fn test_same_title_twice_gives_different_links() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let session = ready(&app).await;

    let args = json!({"title": "Daily Log", "contents": "first", "output_format": "txt"});
    let first = result_text(&post(&app, call(2, "convert-contents", args), Some(&session)).await.json());
    let args = json!({"title": "Daily Log", "contents": "second", "output_format": "txt"});
    let second = result_text(&post(&app, call(3, "convert-contents", args), Some(&session)).await.json());

    let (first, second) = (file_uri(&first), file_uri(&second));
    assert_ne!(first, second);
    assert_eq!(get(&app, &first).await.body, "first\n");
    assert_eq!(get(&app, &second).await.body, "second\n");
}

#[tokio::test]
async fn test_docx_template_policy() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let session = ready(&app).await;
    let args = json!({"title": "Board Memo", "contents": "# Agenda\n\n- one", "output_format": "docx"});

    let response = post(&app, call(2, "convert-contents", args.clone()), Some(&session))
        .await
        .json();
    assert_eq!(response["error"]["code"], -32010);
    assert_eq!(response["error"]["data"]["kind"], "template_required");

    let templates = temp.path().join("templates");
    fs::create_dir(&templates).unwrap();
    fs::write(templates.join("corporate.docx"), template_with_styles(&["Heading1"])).unwrap();
    let response = post(&app, call(3, "convert-contents", args.clone()), Some(&session))
        .await
        .json();
    let text = result_text(&response);
    assert!(text.contains("board_memo_00.docx"));
    let file = get(&app, &file_uri(&text)).await;
    assert_eq!(file.status, StatusCode::OK);
    assert_eq!(
        file.headers[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );

    fs::write(templates.join("memo.docx"), template_with_styles(&[])).unwrap();
    let response = post(&app, call(4, "convert-contents", args.clone()), Some(&session))
        .await
        .json();
    assert_eq!(response["error"]["code"], -32011);

    let mut chosen = args;
    chosen["reference_doc"] = json!("B");
    let response = post(&app, call(5, "convert-contents", chosen), Some(&session))
        .await
        .json();
    assert!(result_text(&response).contains("board_memo_01.docx"));
}

#[tokio::test]
async fn test_template_listing_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let templates = temp.path().join("templates");
    fs::create_dir(&templates).unwrap();
    for name in ["zeta.css", "alpha.css", "mid.css"] {
        fs::write(templates.join(name), "body { font-size: 11pt }").unwrap();
    }
    let app = app(&temp);
    let session = ready(&app).await;

    let first = post(&app, call(2, "list-templates", json!({"format": "pdf"})), Some(&session))
        .await
        .json();
    let second = post(&app, call(3, "list-templates", json!({"format": "pdf"})), Some(&session))
        .await
        .json();
    let text = result_text(&first);
    assert_eq!(text, result_text(&second));
    assert!(text.contains("A. alpha.css\nB. mid.css\nC. zeta.css"));
}

#[tokio::test]
async fn test_output_dir_escape_is_path_violation() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let session = ready(&app).await;
    let args = json!({"title": "x", "contents": "y", "output_dir": "../outside"});
    let response = post(&app, call(2, "convert-contents", args), Some(&session))
        .await
        .json();
    assert_eq!(response["error"]["code"], -32001);
    assert_eq!(response["error"]["message"], "invalid path");
    assert!(!response.to_string().contains(&temp.path().display().to_string()));
}

// =============================================================================
// FILE SERVER
// =============================================================================

#[tokio::test]
async fn test_encoded_traversal_is_not_found() {
    let outer = TempDir::new().unwrap();
    fs::write(outer.path().join("secret.txt"), "secret").unwrap();
    let root = outer.path().join("root");
    fs::create_dir(&root).unwrap();
    let root = TempDir::new_in(&root).unwrap();
    let app = app(&root);

    for uri in [
        "/files/..%2f..%2fetc%2fpasswd",
        "/files/%2e%2e/%2e%2e/secret.txt",
        "/files/..%2F..%2Fsecret.txt",
        "/files/%2Fetc%2Fpasswd",
    ] {
        let reply = get(&app, uri).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{}", uri);
        assert!(reply.body.is_empty(), "{}", uri);
    }
}

#[tokio::test]
async fn test_missing_directory_and_hidden_are_uniform_404() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("reports")).unwrap();
    fs::write(temp.path().join(".env"), "TOKEN=1").unwrap();
    let app = app(&temp);

    for uri in ["/files/nope.pdf", "/files/reports", "/files/.env"] {
        let reply = get(&app, uri).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{}", uri);
        assert!(reply.body.is_empty(), "{}", uri);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_is_not_found() {
    let outside = TempDir::new().unwrap();
    fs::write(outside.path().join("secret.txt"), "secret").unwrap();
    let temp = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path().join("secret.txt"), temp.path().join("link.txt"))
        .unwrap();
    let app = app(&temp);

    let reply = get(&app, "/files/link.txt").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/files/report.pdf")
        .header(header::ORIGIN, "http://chat.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let reply = send(&app, request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
