//! End-to-end protocol tests: a real client speaking WebSocket to a real
//! server, covering the handshake, the register frame, task dispatch,
//! policy refusals, timeouts, the busy gate, and idle eviction.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use smith_browser::BrowserHost;
use smith_server::runtime::build_executor;
use smith_server::ProtocolServer;
use smith_types::AgentConfig;

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const TOKEN: &str = "test-token-T";

/// Base config bound to an ephemeral port with a temp sandbox.
fn agent_config(sandbox: &std::path::Path) -> AgentConfig {
    let mut config = AgentConfig::default_for("e2e-agent", sandbox.to_path_buf());
    config.port = 0;
    config.auth_token = TOKEN.to_string();
    config.max_concurrent_tasks = 2;
    config
}

/// Boot a server and return it with its bound address.
async fn start_agent(
    config: AgentConfig,
    browser_cache: &std::path::Path,
) -> (Arc<ProtocolServer>, SocketAddr) {
    let config = Arc::new(config);
    let host = Arc::new(BrowserHost::new(browser_cache.to_path_buf()));
    let executor = Arc::new(build_executor(&config, host).expect("executor should build"));
    let server = Arc::new(ProtocolServer::new(config, executor));

    let run_server = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = run_server.run().await;
    });

    let addr = tokio::time::timeout(Duration::from_secs(5), server.local_addr())
        .await
        .expect("server should start listening")
        .expect("listening address");
    (server, addr)
}

/// Connect with the given auth token (and optionally a protocol version).
async fn connect(
    addr: SocketAddr,
    token: &str,
    protocol_version: Option<&str>,
) -> Result<WsClient, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-smith-auth", token.parse().unwrap());
    if let Some(version) = protocol_version {
        request
            .headers_mut()
            .insert("x-smith-protocol-version", version.parse().unwrap());
    }
    let (client, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(client)
}

/// Next JSON text frame, or None when the connection ends/closes.
async fn next_frame(client: &mut WsClient) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("frame should arrive in time")?;
        match message {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(&text).expect("frames are JSON"))
            }
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

async fn send_json(client: &mut WsClient, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

/// Connect, consume the register frame, and hand back the client.
async fn connect_registered(addr: SocketAddr) -> (WsClient, Value) {
    let mut client = connect(addr, TOKEN, None).await.expect("handshake should pass");
    let register = next_frame(&mut client).await.expect("register frame");
    assert_eq!(register["type"], "register", "first frame must be register");
    (client, register)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_read_file() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    std::fs::write(sandbox.path().join("hello.txt"), "hi").unwrap();

    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;
    let (mut client, register) = connect_registered(addr).await;

    // Register advertises capabilities and the protocol version.
    assert_eq!(register["protocol_version"], 1);
    let capabilities: Vec<&str> = register["capabilities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert!(capabilities.contains(&"read_file"));
    assert!(capabilities.contains(&"run_command"));
    assert!(capabilities.contains(&"browser_search"));

    send_json(
        &mut client,
        json!({
            "type": "task",
            "id": "a",
            "payload": {"tool": "read_file", "args": {"file_path": "hello.txt"}},
        }),
    )
    .await;

    let progress = next_frame(&mut client).await.unwrap();
    assert_eq!(progress["type"], "task_progress");
    assert_eq!(progress["id"], "a");
    assert_eq!(progress["progress"]["percent"], 0);

    let result = next_frame(&mut client).await.unwrap();
    assert_eq!(result["type"], "task_result");
    assert_eq!(result["id"], "a");
    assert_eq!(result["result"]["success"], true);
    assert_eq!(result["result"]["data"], "hi");
    assert!(result["result"]["duration_ms"].as_u64().is_some());
    assert!(result["result"].get("error").is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn sandbox_escape_is_refused() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    send_json(
        &mut client,
        json!({
            "type": "task",
            "id": "b",
            "payload": {"tool": "read_file", "args": {"file_path": "/etc/passwd"}},
        }),
    )
    .await;

    let progress = next_frame(&mut client).await.unwrap();
    assert_eq!(progress["type"], "task_progress");
    let result = next_frame(&mut client).await.unwrap();
    assert_eq!(result["id"], "b");
    assert_eq!(result["result"]["success"], false);
    assert!(result["result"]["error"]
        .as_str()
        .unwrap()
        .contains("outside the sandbox"));

    server.shutdown().await;
}

#[tokio::test]
async fn readonly_mode_refuses_writes() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = agent_config(sandbox.path());
    config.readonly_mode = true;
    let (server, addr) = start_agent(config, cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    send_json(
        &mut client,
        json!({
            "type": "task",
            "id": "c",
            "payload": {"tool": "write_file", "args": {"file_path": "x", "content": "y"}},
        }),
    )
    .await;

    let _progress = next_frame(&mut client).await.unwrap();
    let result = next_frame(&mut client).await.unwrap();
    assert_eq!(result["id"], "c");
    assert_eq!(result["result"]["success"], false);
    assert!(result["result"]["error"].as_str().unwrap().contains("read-only"));
    assert!(!sandbox.path().join("x").exists(), "no file may be created");

    server.shutdown().await;
}

#[tokio::test]
async fn disallowed_binary_is_refused() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = agent_config(sandbox.path());
    config.allowed_shell_commands = vec!["git".into()];
    let (server, addr) = start_agent(config, cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    send_json(
        &mut client,
        json!({
            "type": "task",
            "id": "d",
            "payload": {"tool": "run_command", "args": {"command": "rm", "args": ["-rf", "/"]}},
        }),
    )
    .await;

    let _progress = next_frame(&mut client).await.unwrap();
    let result = next_frame(&mut client).await.unwrap();
    assert_eq!(result["id"], "d");
    assert_eq!(result["result"]["success"], false);
    assert!(result["result"]["error"]
        .as_str()
        .unwrap()
        .contains("allowed_commands"));

    server.shutdown().await;
}

#[tokio::test]
async fn command_timeout_is_enforced() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = agent_config(sandbox.path());
    config.timeout_ms = 300;
    let (server, addr) = start_agent(config, cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    send_json(
        &mut client,
        json!({
            "type": "task",
            "id": "e",
            "payload": {"tool": "run_command", "args": {"command": "sleep", "args": ["5"]}},
        }),
    )
    .await;

    let _progress = next_frame(&mut client).await.unwrap();
    let result = next_frame(&mut client).await.unwrap();
    assert_eq!(result["id"], "e");
    assert_eq!(result["result"]["success"], false);
    assert!(result["result"]["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(result["result"]["data"]["timed_out"], true);
    let duration = result["result"]["duration_ms"].as_u64().unwrap();
    assert!(
        (300..3_000).contains(&duration),
        "duration {duration} should reflect the timeout, not the sleep"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn busy_cap_rejects_immediately() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = agent_config(sandbox.path());
    config.max_concurrent_tasks = 1;
    let (server, addr) = start_agent(config, cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    // First task occupies the single slot for a while.
    send_json(
        &mut client,
        json!({
            "type": "task",
            "id": "long",
            "payload": {"tool": "run_command", "args": {"command": "sleep", "args": ["1.5"]}},
        }),
    )
    .await;
    // Second task hits the cap.
    send_json(
        &mut client,
        json!({
            "type": "task",
            "id": "rejected",
            "payload": {"tool": "read_file", "args": {"file_path": "x"}},
        }),
    )
    .await;

    let mut busy_result = None;
    let mut long_result = None;
    let mut long_progress = false;
    while busy_result.is_none() || long_result.is_none() {
        let frame = next_frame(&mut client).await.expect("stream should stay open");
        match (frame["type"].as_str().unwrap(), frame["id"].as_str()) {
            ("task_progress", Some("long")) => long_progress = true,
            ("task_result", Some("rejected")) => {
                assert!(
                    long_result.is_none(),
                    "busy rejection must not wait for the long task"
                );
                busy_result = Some(frame);
            }
            ("task_result", Some("long")) => long_result = Some(frame),
            _ => {}
        }
    }

    assert!(long_progress, "the accepted task must emit progress");
    let busy = busy_result.unwrap();
    assert_eq!(busy["result"]["success"], false);
    assert!(busy["result"]["error"].as_str().unwrap().contains("busy"));
    assert_eq!(busy["result"]["duration_ms"], 0);

    // Exactly one result per task id, and the long task completed.
    assert_eq!(long_result.unwrap()["result"]["data"]["exit_code"], 0);

    server.shutdown().await;
}

#[tokio::test]
async fn wrong_token_is_refused_with_no_frames() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;

    let err = connect(addr, "wrong-token", None).await.err();
    assert!(err.is_some(), "handshake must be refused");
    if let Some(tokio_tungstenite::tungstenite::Error::Http(response)) = err {
        assert_eq!(response.status(), 401);
    }

    // Missing token is refused the same way.
    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request.headers_mut().remove("x-smith-auth");
    assert!(tokio_tungstenite::connect_async(request).await.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn protocol_version_is_checked_when_present() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;

    // Matching version passes.
    let client = connect(addr, TOKEN, Some("1")).await;
    assert!(client.is_ok());

    // Mismatched or garbage versions are refused.
    assert!(connect(addr, TOKEN, Some("2")).await.is_err());
    assert!(connect(addr, TOKEN, Some("banana")).await.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn ping_and_config_query_do_not_occupy_task_slots() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = agent_config(sandbox.path());
    config.readonly_mode = true;
    config.enable_git = false;
    let (server, addr) = start_agent(config, cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    send_json(&mut client, json!({"type": "ping", "timestamp": 123.0})).await;
    let pong = next_frame(&mut client).await.unwrap();
    assert_eq!(pong["type"], "pong");
    let stats = &pong["stats"];
    assert!(stats["memory_total_mb"].as_u64().unwrap() > 0);
    assert!(stats["cpu_percent"].as_u64().unwrap() <= 100);
    assert!(stats["hostname"].as_str().is_some());

    send_json(&mut client, json!({"type": "config_query"})).await;
    let report = next_frame(&mut client).await.unwrap();
    assert_eq!(report["type"], "config_report");
    let devkit = &report["devkit"];
    assert_eq!(devkit["readonly_mode"], true);
    let categories: Vec<&str> = devkit["enabled_categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert!(!categories.contains(&"git"));
    assert!(categories.contains(&"filesystem"));
    assert!(categories.contains(&"browser"));

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_and_unknown_frames_keep_the_connection() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    // Unparseable JSON, valid JSON without a type, and an unknown type:
    // all logged, none fatal.
    for bad in [
        "not json at all".to_string(),
        json!({"no_type": true}).to_string(),
        json!({"type": "cancel", "id": "x"}).to_string(),
    ] {
        client.send(Message::Text(bad.into())).await.unwrap();
    }

    send_json(&mut client, json!({"type": "ping"})).await;
    let pong = next_frame(&mut client).await.unwrap();
    assert_eq!(pong["type"], "pong", "connection must survive bad frames");

    server.shutdown().await;
}

#[tokio::test]
async fn oversized_frames_are_dropped_without_disconnect() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    // A structurally valid task frame over the 1 MiB cap: dropped, so no
    // task_result for its id may ever arrive.
    let padding = "p".repeat(1024 * 1024 + 1);
    let oversized = json!({
        "type": "task",
        "id": "huge",
        "payload": {"tool": "read_file", "args": {"file_path": padding}},
    });
    client
        .send(Message::Text(oversized.to_string().into()))
        .await
        .unwrap();

    send_json(&mut client, json!({"type": "ping"})).await;
    let frame = next_frame(&mut client).await.unwrap();
    assert_eq!(
        frame["type"], "pong",
        "oversized frame must be dropped silently, got {frame}"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn idle_connections_are_swept() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = agent_config(sandbox.path());
    config.idle_timeout_ms = Some(400);
    let (server, addr) = start_agent(config, cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    // No traffic: within idle_timeout + sweep period the server closes us.
    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("idle sweep should close the connection in time");
    assert!(closed);

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_sends_going_away_and_is_idempotent() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;
    let (mut client, _) = connect_registered(addr).await;

    server.shutdown().await;
    server.shutdown().await; // second call is a no-op

    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        assert_eq!(u16::from(frame.code), 1001, "going away close code");
                    }
                    return true;
                }
                None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("shutdown should close connections promptly");
    assert!(closed);

    // New connections are refused once the listener is down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(connect(addr, TOKEN, None).await.is_err());
}

#[tokio::test]
async fn reconnect_advertises_stable_capabilities() {
    let sandbox = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let (server, addr) = start_agent(agent_config(sandbox.path()), cache.path()).await;

    let (_c1, register1) = connect_registered(addr).await;
    let (_c2, register2) = connect_registered(addr).await;
    assert_eq!(
        register1["capabilities"], register2["capabilities"],
        "capabilities must be stable for constant config"
    );

    server.shutdown().await;
}
