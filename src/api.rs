//! Thin REST request builders for the chat backend.
//!
//! Stateless request/response calls; the session supplies cookies and the
//! XSRF header, this module adds the client-version header and checks
//! statuses. Listing endpoints return raw JSON; callers pick what they need.

use crate::config::{CLIENT_VERSION_HEADER, Endpoints};
use crate::error::{Error, Result};
use crate::session::Session;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Deserialize)]
pub struct StreamingToken {
    #[serde(rename = "streamingApiToken")]
    pub token: Option<String>,
    #[serde(rename = "lastEventId")]
    pub last_event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotAccount {
    #[serde(rename = "botId")]
    pub bot_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "basicSearchId", default)]
    pub basic_search_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotList {
    #[serde(default)]
    pub list: Vec<BotAccount>,
}

#[derive(Clone, Debug)]
pub struct ChatApi {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl ChatApi {
    pub fn new(endpoints: Endpoints) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_http(http, endpoints))
    }

    pub fn with_http(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn headers(&self, session: &Session) -> HeaderMap {
        let mut headers = session.headers();
        if let Ok(value) = HeaderValue::from_str(&self.endpoints.client_version) {
            headers.insert(CLIENT_VERSION_HEADER, value);
        }
        headers
    }

    /// Fetches the short-lived token the stream endpoint authenticates with.
    /// The response may also carry the server-side resume point.
    pub async fn streaming_api_token(
        &self,
        session: &Session,
        bot_id: &str,
    ) -> Result<(String, Option<String>)> {
        let url = format!("{}/bots/{bot_id}/streamingApiToken", self.endpoints.api_v1());
        let resp = self
            .http
            .post(&url)
            .headers(self.headers(session))
            .send()
            .await?;
        let info: StreamingToken = check(resp).await?.json().await?;
        let token = info
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("streamingApiToken missing or empty".to_string()))?;
        Ok((token, info.last_event_id))
    }

    /// Sends a text message. `quote_token` turns it into a reply.
    pub async fn send_text_message(
        &self,
        session: &Session,
        bot_id: &str,
        chat_id: &str,
        text: &str,
        quote_token: Option<&str>,
    ) -> Result<()> {
        let mut payload = json!({
            "id": "",
            "type": "textV2",
            "text": text,
            "sendId": generate_send_id(chat_id),
        });
        if let Some(quote) = quote_token {
            payload["quoteToken"] = json!(quote);
        }
        self.post_message(session, bot_id, chat_id, &payload).await
    }

    /// Sends a mention: a text message whose `mentions` span covers the
    /// leading `@id ` token.
    pub async fn send_mention(
        &self,
        session: &Session,
        bot_id: &str,
        chat_id: &str,
        mentionee_id: &str,
    ) -> Result<()> {
        let mention_text = format!("@{mentionee_id} ");
        let payload = json!({
            "type": "text",
            "text": mention_text,
            "mentions": [{
                "userId": mentionee_id,
                "offset": 0,
                "length": mention_text.len(),
            }],
        });
        self.post_message(session, bot_id, chat_id, &payload).await
    }

    async fn post_message(
        &self,
        session: &Session,
        bot_id: &str,
        chat_id: &str,
        payload: &Value,
    ) -> Result<()> {
        let url = format!(
            "{}/bots/{bot_id}/chats/{chat_id}/messages/send",
            self.endpoints.api_v1()
        );
        let resp = self
            .http
            .post(&url)
            .headers(self.headers(session))
            .json(payload)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Uploads a file, then bulk-sends the returned content token.
    pub async fn send_file(
        &self,
        session: &Session,
        bot_id: &str,
        chat_id: &str,
        file_path: &Path,
    ) -> Result<Value> {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let bytes = tokio::fs::read(file_path).await?;

        let upload_url = format!(
            "{}/bots/{bot_id}/messages/{chat_id}/uploadFile",
            self.endpoints.api_v1()
        );
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .http
            .post(&upload_url)
            .headers(self.headers(session))
            .multipart(form)
            .send()
            .await?;
        let uploaded: Value = check(resp).await?.json().await?;
        let token = uploaded
            .get("contentMessageToken")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Auth("no contentMessageToken returned".to_string()))?;

        let bulk_url = format!(
            "{}/bots/{bot_id}/chats/{chat_id}/messages/bulkSendFiles",
            self.endpoints.api_v1()
        );
        let payload = json!({
            "items": [{
                "sendId": generate_send_id(chat_id),
                "contentMessageToken": token,
            }],
        });
        let resp = self
            .http
            .post(&bulk_url)
            .headers(self.headers(session))
            .json(&payload)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn bots(&self, session: &Session, limit: u32) -> Result<BotList> {
        let url = format!("{}/bots", self.endpoints.api_v1());
        let resp = self
            .http
            .get(&url)
            .headers(self.headers(session))
            .query(&[("limit", limit.to_string()), ("noFilter", "true".to_string())])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn chats(&self, session: &Session, bot_id: &str, limit: u32) -> Result<Value> {
        let url = format!("{}/bots/{bot_id}/chats", self.endpoints.api_v2());
        let resp = self
            .http
            .get(&url)
            .headers(self.headers(session))
            .query(&[
                ("folderType", "ALL".to_string()),
                ("tagIds", String::new()),
                ("autoTagIds", String::new()),
                ("limit", limit.to_string()),
                ("prioritizePinnedChat", "true".to_string()),
            ])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Message history. `before`/`after` are forwarded only when numeric,
    /// matching the web client.
    pub async fn chat_messages(
        &self,
        session: &Session,
        bot_id: &str,
        chat_id: &str,
        limit: u32,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<Value> {
        let url = format!(
            "{}/bots/{bot_id}/chats/{chat_id}/messages",
            self.endpoints.api_v3()
        );
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before.filter(|v| v.chars().all(|c| c.is_ascii_digit())) {
            query.push(("before", before.to_string()));
        }
        if let Some(after) = after.filter(|v| v.chars().all(|c| c.is_ascii_digit())) {
            query.push(("after", after.to_string()));
        }
        let resp = self
            .http
            .get(&url)
            .headers(self.headers(session))
            .query(&query)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn chat_members(
        &self,
        session: &Session,
        bot_id: &str,
        chat_id: &str,
        limit: u32,
    ) -> Result<Value> {
        let url = format!(
            "{}/bots/{bot_id}/chats/{chat_id}/members",
            self.endpoints.api_v1()
        );
        let resp = self
            .http
            .get(&url)
            .headers(self.headers(session))
            .query(&[("limit", limit.to_string())])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Fallback CSRF fetch for sessions whose cookie set lacks the token.
    pub async fn csrf_token(&self, session: &Session) -> Result<String> {
        let url = format!("{}/csrfToken", self.endpoints.api_v1());
        let resp = self
            .http
            .get(&url)
            .headers(self.headers(session))
            .send()
            .await?;
        let body: Value = check(resp).await?.json().await?;
        body.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Auth("csrfToken response has no token".to_string()))
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::UnexpectedStatus { status, body })
}

/// Client-generated send id: `{chat}_{millis}_{7-digit random}`.
fn generate_send_id(chat_id: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let nonce = rand::rng().random_range(1_000_000..=9_999_999);
    format!("{chat_id}_{millis}_{nonce}")
}
