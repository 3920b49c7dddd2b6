//! Data models for the QFOS engine.
//!
//! - [`Request`] — the normalized input record (spec §3)
//! - [`Provider`] — opaque upstream-classifier label, equality-only
//! - [`Session`] — a bundle produced by the engine
//! - [`report`] — the final `OptScoreReport` artifact

pub mod report;
pub mod session;

pub use session::{RefinementOrigin, Session, SessionFlags};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Opaque provider label (e.g. `OpenAI`, `Anthropic`, `Other`).
///
/// Treated opaquely except for equality and the exclusion set (spec §9:
/// "provider is a string label... except for equality and the exclusion
/// set").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provider(pub String);

impl Provider {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_excluded(&self, exclude: &HashSet<Provider>) -> bool {
        exclude.contains(self)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Provider {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coarse bot classification derived at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotCategory {
    UserRequest,
    Crawler,
    Other,
}

/// A single normalized HTTP request record (spec §3).
///
/// Required attributes are non-optional fields; optional CDN-log columns
/// are `Option<T>`, never null-sentinel values (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Stable identifier for this record within a single engine run.
    pub id: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub client_ip: String,
    pub method: String,
    pub host: String,
    pub path: String,
    pub status_code: u16,
    pub user_agent: String,
    pub provider: Provider,
    pub bot_category: BotCategory,

    #[serde(default)]
    pub query_string: Option<String>,
    #[serde(default)]
    pub response_bytes: Option<u64>,
    #[serde(default)]
    pub request_bytes: Option<u64>,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub cache_status: Option<String>,
    #[serde(default)]
    pub edge_location: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub ssl_protocol: Option<String>,
}

impl Request {
    /// Millisecond-resolution timestamp used for gap arithmetic (spec §4.3:
    /// "`gap` uses integer millisecond resolution").
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}
