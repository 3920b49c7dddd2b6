//! Session (bundle) type produced by the engine (spec §3).

use super::Provider;
use serde::{Deserialize, Serialize};

/// How a session came to exist: a fresh bundler output, or a child of a
/// refinement split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementOrigin {
    Initial,
    SplitFrom(String),
}

/// Flags describing notable properties of a session, set by bundling and
/// refinement (spec §3, §4.4, §4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags {
    pub singleton: bool,
    pub giant: bool,
    pub low_coherence: bool,
}

/// A session (bundle) emitted by a single bundler pass, optionally refined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, stable within a single engine run: `provider:start_ts:seq`.
    pub session_id: String,
    pub provider: Provider,
    pub start_ts: chrono::DateTime<chrono::Utc>,
    pub end_ts: chrono::DateTime<chrono::Utc>,
    /// Ordered member request ids (timestamp order).
    pub request_ids: Vec<u64>,
    /// The gap threshold W (ms) that produced this bundle.
    pub window_used: u64,
    /// `None` when refinement is disabled.
    pub refinement_origin: Option<RefinementOrigin>,
    /// Mean intra-bundle cosine similarity; `None` when size < 2.
    pub mibcs: Option<f64>,
    pub flags: SessionFlags,
}

impl Session {
    #[must_use]
    pub fn size(&self) -> usize {
        self.request_ids.len()
    }

    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.size() == 1
    }
}
