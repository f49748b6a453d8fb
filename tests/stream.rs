use lineoa::{Endpoints, EventStreamClient, Identity, Payload, Session, StreamParams};
use lineoa::storage::CookieRecord;
use serde_json::json;
use tokio::time::{Duration, timeout};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_session() -> Session {
    Session::new(
        &[
            CookieRecord::new("ses", "abc", Some("chat.line.biz")),
            CookieRecord::new("XSRF-TOKEN", "tok", Some("chat.line.biz")),
        ],
        Identity::default(),
    )
}

fn endpoints_for(server: &MockServer) -> Endpoints {
    Endpoints {
        chat_base: server.uri(),
        streaming_base: server.uri(),
        ..Endpoints::default()
    }
}

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_raw(body.to_string(), "text/event-stream")
}

#[tokio::test]
async fn delivers_parsed_events_in_arrival_order() {
    let server = MockServer::start().await;
    let body = concat!(
        ":heartbeat\n",
        "id:1\nevent:chat\ndata:{\"n\":1}\n\n",
        "id:2\nevent:chat\ndata:{\"n\":2}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/api/v2/sse"))
        .and(query_param("token", "stream-token"))
        .and(query_param("clientType", "PC"))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let client = EventStreamClient::new(endpoints_for(&server), test_session()).unwrap();
    let mut stream = client
        .connect("stream-token", StreamParams::default())
        .await
        .unwrap();

    let first = stream.next_event().await.unwrap();
    assert_eq!(first.id.as_deref(), Some("1"));
    assert_eq!(first.event_type.as_deref(), Some("chat"));
    assert_eq!(first.payload, Payload::Json(json!({"n": 1})));

    let second = stream.next_event().await.unwrap();
    assert_eq!(second.id.as_deref(), Some("2"));

    stream.stop();
}

#[tokio::test]
async fn reconnect_resumes_from_last_emitted_event_id() {
    let server = MockServer::start().await;

    // First connection carries no resume parameter and drops after one event.
    Mock::given(method("GET"))
        .and(path("/api/v2/sse"))
        .and(query_param_is_missing("lastEventId"))
        .respond_with(sse_response("id:7\nevent:chat\ndata:{\"n\":1}\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    // The reconnect must resume from the last emitted id.
    Mock::given(method("GET"))
        .and(path("/api/v2/sse"))
        .and(query_param("lastEventId", "7"))
        .respond_with(sse_response("id:8\nevent:chat\ndata:{\"n\":2}\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = EventStreamClient::new(endpoints_for(&server), test_session()).unwrap();
    let mut stream = client
        .connect("stream-token", StreamParams::default())
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(5), stream.next_event())
        .await
        .expect("first event")
        .unwrap();
    assert_eq!(first.id.as_deref(), Some("7"));

    let second = timeout(Duration::from_secs(5), stream.next_event())
        .await
        .expect("second event after reconnect")
        .unwrap();
    assert_eq!(second.id.as_deref(), Some("8"));

    stream.stop();
}

#[tokio::test]
async fn caller_supplied_resume_id_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/sse"))
        .and(query_param("lastEventId", "41"))
        .respond_with(sse_response("id:42\nevent:chat\ndata:{}\n\n"))
        .mount(&server)
        .await;

    let params = StreamParams {
        last_event_id: Some("41".to_string()),
        ..StreamParams::default()
    };
    let client = EventStreamClient::new(endpoints_for(&server), test_session()).unwrap();
    let mut stream = client.connect("stream-token", params).await.unwrap();
    let event = stream.next_event().await.unwrap();
    assert_eq!(event.id.as_deref(), Some("42"));
    stream.stop();
}

#[tokio::test]
async fn non_success_status_fails_the_initial_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/sse"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let client = EventStreamClient::new(endpoints_for(&server), test_session()).unwrap();
    let err = client
        .connect("stream-token", StreamParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, lineoa::Error::UnexpectedStatus { status, .. } if status == 401));
}

#[tokio::test]
async fn stop_ends_the_stream_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/sse"))
        .respond_with(sse_response("id:1\ndata:{}\n\n"))
        .mount(&server)
        .await;

    let client = EventStreamClient::new(endpoints_for(&server), test_session()).unwrap();
    let mut stream = client
        .connect("stream-token", StreamParams::default())
        .await
        .unwrap();
    let _ = stream.next_event().await.unwrap();

    stream.stop();
    assert!(stream.is_stopped());
    // Already-buffered events may still drain, but the channel must close
    // promptly with no further reconnects.
    loop {
        let next = timeout(Duration::from_secs(5), stream.next_event())
            .await
            .expect("stop must unblock the read");
        if next.is_none() {
            break;
        }
    }
}
