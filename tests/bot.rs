use lineoa::storage::{CookieRecord, StorageData};
use lineoa::{ChatBot, Endpoints, HandlerRegistry, SendOutcome};
use serde_json::json;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_storage(dir: &TempDir, data: &StorageData) -> PathBuf {
    let path = dir.path().join("lineoa-storage.json");
    std::fs::write(&path, serde_json::to_string_pretty(data).unwrap()).unwrap();
    path
}

fn storage_with_cookies() -> StorageData {
    StorageData {
        user_name: Some("alice".to_string()),
        email: Some("alice@example.com".to_string()),
        cookies: Some(vec![
            CookieRecord::new("ses", "abc", Some("chat.line.biz")),
            CookieRecord::new("XSRF-TOKEN", "tok", Some("chat.line.biz")),
            CookieRecord::new("mgr", "m1", Some("manager.line.biz")),
        ]),
        ..StorageData::default()
    }
}

async fn bot_against(server: &MockServer, path: &PathBuf) -> ChatBot {
    ChatBot::from_storage(path)
        .unwrap()
        .with_endpoints(Endpoints {
            chat_base: server.uri(),
            streaming_base: server.uri(),
            ..Endpoints::default()
        })
        .unwrap()
}

#[tokio::test]
async fn restored_session_sends_merged_cookies_and_xsrf_header() {
    let dir = TempDir::new().unwrap();
    let storage_path = write_storage(&dir, &storage_with_cookies());
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/bots"))
        .and(header("cookie", "ses=abc; XSRF-TOKEN=tok; mgr=m1"))
        .and(header("x-xsrf-token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [{"botId": "B1", "name": "primary"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let bot = bot_against(&server, &storage_path).await;
    assert_eq!(bot.default_bot_id().await.unwrap(), "B1");
}

#[tokio::test]
async fn missing_storage_is_a_fatal_restore_error() {
    let dir = TempDir::new().unwrap();
    let err = ChatBot::from_storage(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, lineoa::Error::InvalidStorage(_)));
}

#[tokio::test]
async fn listen_fetches_token_and_dispatches_message_events() {
    let dir = TempDir::new().unwrap();
    let storage_path = write_storage(&dir, &storage_with_cookies());
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/bots/B1/streamingApiToken"))
        .and(header("x-xsrf-token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "streamingApiToken": "stream-tok",
            "lastEventId": "5"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let event = json!({
        "subEvent": "message",
        "chatId": "C1",
        "payload": {"type": "message", "message": {"type": "text", "text": "hi"}}
    });
    let body = format!("id:6\nevent:chat\ndata:{event}\n\n");
    Mock::given(method("GET"))
        .and(path("/api/v2/sse"))
        .and(query_param("token", "stream-tok"))
        .and(query_param("lastEventId", "5"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let bot = bot_against(&server, &storage_path).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut registry = HandlerRegistry::new();
    registry.register("message", move |event| {
        let text = event
            .payload
            .as_json()
            .and_then(|p| p.pointer("/payload/message/text"))
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        tx.send((event.id.clone(), text)).unwrap();
        Ok(())
    });

    let handle = bot.listen("B1", registry).await.unwrap();
    let (id, text) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("dispatched event")
        .unwrap();
    assert_eq!(id.as_deref(), Some("6"));
    assert_eq!(text, "hi");

    handle.stop();
    timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("listen loop must stop promptly");
}

#[tokio::test]
async fn missing_stream_token_is_an_auth_error() {
    let dir = TempDir::new().unwrap();
    let storage_path = write_storage(&dir, &storage_with_cookies());
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/bots/B1/streamingApiToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let bot = bot_against(&server, &storage_path).await;
    let err = bot.listen("B1", HandlerRegistry::new()).await.unwrap_err();
    assert!(matches!(err, lineoa::Error::Auth(_)));
}

#[tokio::test]
async fn rate_limited_send_returns_retry_after_without_calling_the_backend() {
    let dir = TempDir::new().unwrap();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64();
    let mut data = storage_with_cookies();
    data.send_timestamps = (0..18).map(|i| now - 1.0 + i as f64 * 0.01).collect();
    let storage_path = write_storage(&dir, &data);

    // No send mock mounted: reaching the backend would 404 and fail the test
    // with an UnexpectedStatus error instead of a Limited outcome.
    let server = MockServer::start().await;
    let bot = bot_against(&server, &storage_path).await;
    let outcome = bot.send_message("B1", "C1", "hello", None).await.unwrap();
    assert!(outcome.is_limited());
    if let SendOutcome::Limited { retry_after } = outcome {
        assert!(retry_after > now);
    }
}

#[tokio::test]
async fn allowed_send_posts_the_text_message() {
    let dir = TempDir::new().unwrap();
    let storage_path = write_storage(&dir, &storage_with_cookies());
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/bots/B1/chats/C1/messages/send"))
        .and(header("x-xsrf-token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let bot = bot_against(&server, &storage_path).await;
    let outcome = bot.send_message("B1", "C1", "hello", None).await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent(()));

    // The send was recorded in durable storage.
    let raw = std::fs::read_to_string(&storage_path).unwrap();
    let reloaded: StorageData = serde_json::from_str(&raw).unwrap();
    assert_eq!(reloaded.send_timestamps.len(), 1);
    assert!(reloaded.final_send_time.is_some());
}
