//! High-level bot: session restore, the listen loop, gated sends.
//!
//! Composes the lower layers: storage restores the session, the API layer
//! fetches the stream token, the stream client feeds the dispatcher, and
//! every outbound send passes the rate-limit gate first.

use crate::api::ChatApi;
use crate::config::{Endpoints, StreamParams};
use crate::dispatch::{EventDispatcher, HandlerRegistry};
use crate::error::{Error, Result};
use crate::rate_limit::epoch_secs;
use crate::send::{GateDecision, SendGate, SendOutcome};
use crate::session::Session;
use crate::storage::Storage;
use crate::stream::EventStreamClient;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug)]
pub struct ChatBot {
    api: ChatApi,
    session: Session,
    storage: Arc<Mutex<Storage>>,
    gate: SendGate,
    endpoints: Endpoints,
    stream_params: StreamParams,
}

impl ChatBot {
    /// Restores the session from a persisted storage file. Fails with
    /// [`Error::InvalidStorage`] when the file is missing or corrupt, in
    /// which case the caller must re-run the external login flow.
    pub fn from_storage(path: impl AsRef<Path>) -> Result<Self> {
        let storage = Storage::load(&path)?;
        let session = Session::from_storage_data(storage.data())?;
        info!(
            user = session.identity().user_name.as_deref().unwrap_or(""),
            "session restored from storage"
        );
        let storage = Arc::new(Mutex::new(storage));
        Ok(Self {
            api: ChatApi::new(Endpoints::default())?,
            session,
            gate: SendGate::new(Arc::clone(&storage)),
            storage,
            endpoints: Endpoints::default(),
            stream_params: StreamParams::default(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Result<Self> {
        self.api = ChatApi::new(endpoints.clone())?;
        self.endpoints = endpoints;
        Ok(self)
    }

    pub fn with_stream_params(mut self, params: StreamParams) -> Self {
        self.stream_params = params;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn api(&self) -> &ChatApi {
        &self.api
    }

    /// First bot account on the logged-in user, used when the caller does
    /// not name one.
    pub async fn default_bot_id(&self) -> Result<String> {
        let bots = self.api.bots(&self.session, 1000).await?;
        bots.list
            .first()
            .map(|bot| bot.bot_id.clone())
            .ok_or(Error::NoBotAccount)
    }

    /// Sends a text message through the rate-limit gate. A limited send is a
    /// normal result carrying the retry-after time, not an error.
    pub async fn send_message(
        &self,
        bot_id: &str,
        chat_id: &str,
        text: &str,
        quote_token: Option<&str>,
    ) -> Result<SendOutcome<()>> {
        let now = epoch_secs(SystemTime::now());
        if let GateDecision::Limited { retry_after } = self.gate.try_acquire(now) {
            return Ok(SendOutcome::Limited { retry_after });
        }
        {
            let mut storage = self.storage.lock().expect("storage lock poisoned");
            if let Err(err) = storage.set_final_send_time(now as i64) {
                tracing::warn!("failed to persist final send time: {err}");
            }
        }
        self.api
            .send_text_message(&self.session, bot_id, chat_id, text, quote_token)
            .await?;
        Ok(SendOutcome::Sent(()))
    }

    pub async fn send_mention(
        &self,
        bot_id: &str,
        chat_id: &str,
        mentionee_id: &str,
    ) -> Result<SendOutcome<()>> {
        let now = epoch_secs(SystemTime::now());
        if let GateDecision::Limited { retry_after } = self.gate.try_acquire(now) {
            return Ok(SendOutcome::Limited { retry_after });
        }
        self.api
            .send_mention(&self.session, bot_id, chat_id, mentionee_id)
            .await?;
        Ok(SendOutcome::Sent(()))
    }

    pub async fn send_file(
        &self,
        bot_id: &str,
        chat_id: &str,
        file_path: &Path,
    ) -> Result<SendOutcome<Value>> {
        let now = epoch_secs(SystemTime::now());
        if let GateDecision::Limited { retry_after } = self.gate.try_acquire(now) {
            return Ok(SendOutcome::Limited { retry_after });
        }
        let response = self
            .api
            .send_file(&self.session, bot_id, chat_id, file_path)
            .await?;
        Ok(SendOutcome::Sent(response))
    }

    /// Fetches a stream token, connects, and dispatches events to `registry`
    /// on a background task until the returned handle is stopped. Events are
    /// dispatched strictly in arrival order; a slow handler delays the ones
    /// behind it.
    pub async fn listen(&self, bot_id: &str, registry: HandlerRegistry) -> Result<ListenHandle> {
        let (token, server_resume) = self.api.streaming_api_token(&self.session, bot_id).await?;
        let mut params = self.stream_params.clone();
        if params.last_event_id.is_none() {
            params.last_event_id = server_resume;
        }
        let client = EventStreamClient::new(self.endpoints.clone(), self.session.clone())?;
        let mut stream = client.connect(&token, params).await?;
        info!(bot_id, "listening for stream events");

        let dispatcher = EventDispatcher::new(registry);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = worker_cancel.cancelled() => break,
                    event = stream.next_event() => match event {
                        Some(event) => dispatcher.dispatch(&event),
                        None => break,
                    }
                }
            }
            stream.stop();
        });
        Ok(ListenHandle { cancel, task })
    }
}

/// Handle over a running listen loop.
#[derive(Debug)]
pub struct ListenHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenHandle {
    /// Stops the stream and the dispatch loop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the dispatch loop to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
