//! Persisted session file.
//!
//! A single JSON file holds the logged-in cookie set, the user identity and
//! the durable rate-limit bookkeeping (recent send timestamps, final send
//! time). The file is produced by the external login flow; this module only
//! reads and rewrites it.

use crate::error::{Error, Result};
use crate::rate_limit;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl CookieRecord {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Absent key is distinct from an empty list: a file without `cookies`
    /// is invalid storage and forces a re-login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Vec<CookieRecord>>,
    #[serde(rename = "SendTimestamps", default, skip_serializing_if = "Vec::is_empty")]
    pub send_timestamps: Vec<f64>,
    #[serde(rename = "FinalsendTime", default, skip_serializing_if = "Option::is_none")]
    pub final_send_time: Option<i64>,
}

#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    data: StorageData,
}

impl Storage {
    /// Strict load for session restore: the file must exist, be non-empty and
    /// carry a `cookies` key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::InvalidStorage(
                "cookie storage does not exist; save logged-in cookies first".to_string(),
            ));
        }
        let raw = fs::read_to_string(path)?;
        if raw.is_empty() {
            return Err(Error::InvalidStorage(
                "cookie storage is empty; save logged-in cookies first".to_string(),
            ));
        }
        let data: StorageData = serde_json::from_str(&raw)
            .map_err(|err| Error::InvalidStorage(format!("cookie storage unreadable: {err}")))?;
        if data.cookies.is_none() {
            return Err(Error::InvalidStorage(
                "cookie storage has no `cookies` key".to_string(),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Lenient open for bookkeeping state: a missing or unreadable file
    /// starts from defaults instead of failing.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, data }
    }

    pub fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &StorageData {
        &self.data
    }

    pub fn final_send_time(&self) -> Option<i64> {
        self.data.final_send_time
    }

    pub fn set_final_send_time(&mut self, timestamp: i64) -> Result<()> {
        self.data.final_send_time = Some(timestamp);
        self.save()
    }

    /// Current send log, cleaned of entries outside the rate-limit window.
    /// Persists the cleanup only when it removed something.
    pub fn send_timestamps(&mut self, now: f64) -> Vec<f64> {
        let mut cleaned = self.data.send_timestamps.clone();
        rate_limit::clean(&mut cleaned, now);
        if cleaned != self.data.send_timestamps {
            self.data.send_timestamps = cleaned.clone();
            if let Err(err) = self.save() {
                tracing::warn!("failed to persist cleaned send log: {err}");
            }
        }
        cleaned
    }

    pub fn record_send(&mut self, now: f64) -> Result<()> {
        rate_limit::record(&mut self.data.send_timestamps, now);
        self.save()
    }
}
