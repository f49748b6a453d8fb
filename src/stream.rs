//! Long-lived SSE connection with reconnect/resume.
//!
//! One spawned task owns the network read for the lifetime of the stream:
//! it opens the GET, feeds chunks through [`SseParser`] and forwards events
//! over a bounded channel. On any transport error or non-success status it
//! reconnects with the id of the last event it emitted as the resume point,
//! so acknowledged events are not replayed (delivery is at-least-once for
//! whatever was in flight). Stopping cancels the token; the worker observes
//! it at every read boundary and exits without further reconnects.

use crate::config::{Endpoints, StreamParams};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::sse::{SseParser, StreamEvent};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, ORIGIN, REFERER};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

pub struct EventStreamClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    session: Session,
}

impl EventStreamClient {
    pub fn new(endpoints: Endpoints, session: Session) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_http(http, endpoints, session))
    }

    pub fn with_http(http: reqwest::Client, endpoints: Endpoints, session: Session) -> Self {
        Self {
            http,
            endpoints,
            session,
        }
    }

    /// Opens the stream. The initial request happens inline so auth and
    /// status failures surface to the caller; after that the spawned worker
    /// owns the connection and reconnects on its own.
    pub async fn connect(&self, token: &str, params: StreamParams) -> Result<EventStream> {
        let worker = StreamWorker {
            http: self.http.clone(),
            url: self.endpoints.sse_url(),
            headers: self.stream_headers(),
            token: token.to_string(),
            params: params.clone(),
            resume: params.last_event_id,
        };
        let first = worker.open(worker.resume.clone()).await?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(worker.run(first, tx, cancel.clone()));
        Ok(EventStream { rx, cancel })
    }

    fn stream_headers(&self) -> HeaderMap {
        let mut headers = self.session.headers();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Ok(value) = HeaderValue::from_str(&self.endpoints.chat_base) {
            headers.insert(ORIGIN, value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("{}/", self.endpoints.chat_base)) {
            headers.insert(REFERER, value);
        }
        headers
    }
}

/// Caller-side handle: receives parsed events and can stop the worker.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl EventStream {
    /// Next event in arrival order, or `None` once the stream has stopped.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Transitions to the terminal state: the blocked read unblocks promptly
    /// and no further reconnect attempt is made.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct StreamWorker {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
    token: String,
    params: StreamParams,
    /// Id of the most recently emitted event; the resume point on reconnect.
    resume: Option<String>,
}

impl StreamWorker {
    async fn open(&self, resume: Option<String>) -> Result<reqwest::Response> {
        let mut query: Vec<(&str, String)> = vec![
            ("token", self.token.clone()),
            ("deviceType", self.params.device_type.clone()),
            ("clientType", self.params.client_type.clone()),
            ("pingSecs", self.params.ping_secs.to_string()),
        ];
        if let Some(id) = resume {
            query.push(("lastEventId", id));
        }
        let resp = self
            .http
            .get(&self.url)
            .headers(self.headers.clone())
            .query(&query)
            .send()
            .await
            .map_err(|err| Error::Connection(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::UnexpectedStatus { status, body });
        }
        Ok(resp)
    }

    async fn run(
        mut self,
        first: reqwest::Response,
        tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) {
        let mut response = Some(first);
        let mut backoff = BACKOFF_INITIAL;
        loop {
            let resp = match response.take() {
                Some(resp) => resp,
                None => match self.open(self.resume.clone()).await {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!("reconnect failed: {err}; next attempt in {backoff:?}");
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(BACKOFF_MAX);
                        continue;
                    }
                },
            };
            debug!("event stream connected");
            backoff = BACKOFF_INITIAL;
            if !self.read_stream(resp, &tx, &cancel).await {
                return;
            }
            if cancel.is_cancelled() {
                return;
            }
            warn!(
                resume = self.resume.as_deref().unwrap_or(""),
                "stream interrupted; reconnecting"
            );
        }
    }

    /// Reads one connection to completion. Returns `false` when the worker
    /// should exit for good (stopped, or every receiver dropped).
    async fn read_stream(
        &mut self,
        resp: reqwest::Response,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut bytes = resp.bytes_stream();
        let mut parser = SseParser::new();
        let mut parsed = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                chunk = bytes.next() => match chunk {
                    Some(Ok(chunk)) => {
                        parser.feed(&chunk, &mut parsed);
                        for event in parsed.drain(..) {
                            trace!(
                                id = event.id.as_deref().unwrap_or(""),
                                event_type = event.event_type.as_deref().unwrap_or(""),
                                "sse event"
                            );
                            let id = event.id.clone();
                            if tx.send(event).await.is_err() {
                                return false;
                            }
                            if let Some(id) = id {
                                self.resume = Some(id);
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!("stream read failed: {err}");
                        return true;
                    }
                    None => {
                        debug!("stream closed by server");
                        return true;
                    }
                }
            }
        }
    }
}
