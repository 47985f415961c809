//! Provider HTTP Tests
//!
//! A throwaway local HTTP server stands in for the provider so the retry
//! policy and error mapping run against real sockets.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use recall_core::config::AiConfig;
use recall_core::{MemoryStore, NewMemory, RecallConfig, RetrievalQuery};
use recall_llm::{AiClient, AiError};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the stub answers every request.
#[derive(Clone)]
enum Reply {
    Status(u16, String),
    Hang,
}

/// Request bodies the stub received, one per connection.
type Seen = Arc<Mutex<Vec<String>>>;

async fn stub(reply: Reply) -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen: Seen = Arc::default();
    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let reply = reply.clone();
            let log = Arc::clone(&log);
            tokio::spawn(async move { answer(socket, reply, log).await });
        }
    });
    (format!("http://{addr}"), seen)
}

async fn answer(mut socket: TcpStream, reply: Reply, log: Seen) {
    let body = read_request(&mut socket).await;
    log.lock().push(body);
    match reply {
        Reply::Hang => tokio::time::sleep(Duration::from_secs(30)).await,
        Reply::Status(code, body) => {
            let response = format!(
                "HTTP/1.1 {code} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    }
}

/// Read one request and return its body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= split + 4 + length {
                return String::from_utf8_lossy(&buf[split + 4..split + 4 + length]).into_owned();
            }
        }
    }
    String::new()
}

fn client(base_url: &str, timeout_ms: u64, max_retries: u32) -> AiClient {
    AiClient::from_config(&AiConfig {
        provider: "openai".into(),
        base_url: base_url.into(),
        api_key: Some("sk-test".into()),
        request_timeout_ms: timeout_ms,
        max_retries,
        ..AiConfig::default()
    })
    .expect("client")
}

#[tokio::test]
async fn silent_provider_times_out_with_configured_budget() {
    let (url, seen) = stub(Reply::Hang).await;
    let client = client(&url, 200, 1);
    match client.extract_embedding("hello").await {
        Err(AiError::Timeout(ms)) => assert_eq!(ms, 200),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(seen.lock().len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let (url, seen) = stub(Reply::Status(400, r#"{"error":"bad model"}"#.into())).await;
    let client = client(&url, 2_000, 3);
    match client.extract_embedding("hello").await {
        Err(AiError::Rejected { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("bad model"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn server_errors_are_retried_until_exhausted() {
    let (url, seen) = stub(Reply::Status(503, r#"{"error":"busy"}"#.into())).await;
    let client = client(&url, 2_000, 2);
    match client.moderate_content("hello").await {
        Err(AiError::RetriesExhausted { attempts, last_error }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(seen.lock().len(), 3);
}

#[tokio::test]
async fn undecodable_success_body_is_parse_error() {
    let (url, seen) = stub(Reply::Status(200, "not json".into())).await;
    let client = client(&url, 2_000, 2);
    assert!(matches!(
        client.extract_embedding("hello").await,
        Err(AiError::ParseError(_))
    ));
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn memory_grounded_reply_sends_system_prompt_and_context() {
    let completion = json!({
        "model": "gpt-4o",
        "choices": [{ "message": { "role": "assistant", "content": "You like tennis." } }],
        "usage": { "completion_tokens": 4 }
    });
    let (url, seen) = stub(Reply::Status(200, completion.to_string())).await;

    let store = MemoryStore::open_in_memory(&RecallConfig::default()).expect("open");
    store
        .store_memory(NewMemory::new("alice", "I like tennis").concepts(["tennis", "sports"]))
        .expect("store");
    let hits = store
        .retrieve(&RetrievalQuery::new("alice", "sports?").concepts(["sports"]))
        .expect("retrieve");

    let client = client(&url, 2_000, 0);
    let reply = client
        .respond_with_memories("alice", &hits, &[], "What do I like?")
        .await
        .expect("reply");
    assert_eq!(reply.text, "You like tennis.");
    assert_eq!(reply.tokens_generated, 4);

    let sent: Value = serde_json::from_str(&seen.lock()[0]).expect("request json");
    let system = sent["messages"][0]["content"].as_str().expect("system prompt");
    assert!(system.starts_with(client.system_prompt()));
    assert!(system.ends_with("- I like tennis"));
    assert_eq!(sent["messages"][1]["content"], "What do I like?");
    assert_eq!(sent["user"], "alice");
}
