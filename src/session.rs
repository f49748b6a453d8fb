//! Authenticated session: effective cookie set, XSRF token, identity.
//!
//! The backend spreads its login cookies over several cooperating domains.
//! A session holds the merged effective set and derives the headers every
//! outbound call needs. Sessions are immutable once built; restore/merge
//! produce a new value, so readers never observe a half-updated session.

use crate::config::{PRIMARY_DOMAIN, SECONDARY_DOMAINS, XSRF_COOKIE, XSRF_HEADER};
use crate::error::{Error, Result};
use crate::storage::{CookieRecord, Storage, StorageData};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    cookies: Vec<CookieRecord>,
    xsrf_token: Option<String>,
    identity: Identity,
}

impl Session {
    /// Builds a session from raw cookies, merging them into the effective set
    /// (see [`merge_cookies`]) and extracting the XSRF token once.
    pub fn new(raw_cookies: &[CookieRecord], identity: Identity) -> Self {
        let cookies = merge_cookies(raw_cookies);
        let xsrf_token = extract_token(&cookies);
        Self {
            cookies,
            xsrf_token,
            identity,
        }
    }

    /// Restores a session from a persisted storage file.
    pub fn restore(path: impl AsRef<Path>) -> Result<Self> {
        let storage = Storage::load(path)?;
        Self::from_storage_data(storage.data())
    }

    pub fn from_storage_data(data: &StorageData) -> Result<Self> {
        let cookies = data
            .cookies
            .as_ref()
            .ok_or_else(|| Error::InvalidStorage("cookie storage has no `cookies` key".to_string()))?;
        let identity = Identity {
            email: data.email.clone(),
            user_name: data.user_name.clone(),
        };
        Ok(Self::new(cookies, identity))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn cookies(&self) -> &[CookieRecord] {
        &self.cookies
    }

    pub fn xsrf_token(&self) -> Option<&str> {
        self.xsrf_token.as_deref()
    }

    /// Serialized `Cookie` header value over the effective set.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Headers for an outbound call: always the cookie set, plus the XSRF
    /// header when a token is known. Skips values that are not valid header
    /// text rather than failing the whole request.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.cookie_header()) {
            headers.insert(COOKIE, value);
        }
        if let Some(token) = &self.xsrf_token {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(HeaderName::from_static(XSRF_HEADER), value);
            }
        }
        headers
    }
}

/// Merges raw cookies into the effective set: all cookies scoped to the
/// primary chat domain first, then cookies from the trusted secondary
/// domains for names the primary domain did not supply. A broader-scoped
/// cookie never shadows a primary-domain cookie of the same name.
pub fn merge_cookies(raw: &[CookieRecord]) -> Vec<CookieRecord> {
    let mut merged: Vec<CookieRecord> = Vec::new();
    for cookie in raw {
        if cookie.domain.as_deref() == Some(PRIMARY_DOMAIN) {
            merged.push(cookie.clone());
        }
    }
    for cookie in raw {
        let Some(domain) = cookie.domain.as_deref() else {
            continue;
        };
        if SECONDARY_DOMAINS.contains(&domain) && !merged.iter().any(|c| c.name == cookie.name) {
            merged.push(cookie.clone());
        }
    }
    merged
}

/// First XSRF cookie scoped to the primary chat domain, if any.
pub fn extract_token(cookies: &[CookieRecord]) -> Option<String> {
    cookies
        .iter()
        .find(|c| {
            c.name == XSRF_COOKIE
                && c.domain
                    .as_deref()
                    .is_some_and(|d| d.contains(PRIMARY_DOMAIN))
        })
        .map(|c| c.value.clone())
}
