//! Client library for a cookie-authenticated, multi-domain chat backend.
//!
//! The library maintains an authenticated session (cookie set + XSRF token)
//! restored from persisted storage, consumes the backend's server-sent event
//! stream with reconnect/resume, routes events to registered handlers, and
//! gates outbound sends behind a sliding-window rate limiter.
//!
//! The interactive login flow that produces the cookie file is an external
//! collaborator; this crate starts from its output.
//!
//! ```no_run
//! use lineoa::{ChatBot, HandlerRegistry};
//!
//! # async fn run() -> lineoa::Result<()> {
//! let bot = ChatBot::from_storage("lineoa-storage.json")?;
//! let bot_id = bot.default_bot_id().await?;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("message", |event| {
//!     println!("message event: {:?}", event.payload);
//!     Ok(())
//! });
//!
//! let handle = bot.listen(&bot_id, registry).await?;
//! handle.join().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bot;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod rate_limit;
pub mod send;
pub mod session;
pub mod sse;
pub mod storage;
pub mod stream;

pub use api::{BotAccount, BotList, ChatApi, StreamingToken};
pub use bot::{ChatBot, ListenHandle};
pub use config::{Endpoints, StreamParams};
pub use dispatch::{
    EventDispatcher, HandlerFailure, HandlerId, HandlerRegistry, MESSAGE_KEY, UNKNOWN_KEY,
};
pub use error::{Error, Result};
pub use send::{GateDecision, SendGate, SendOutcome};
pub use session::{Identity, Session};
pub use sse::{Payload, SseParser, StreamEvent};
pub use storage::{CookieRecord, Storage, StorageData};
pub use stream::{EventStream, EventStreamClient};
