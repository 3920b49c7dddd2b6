//! Temporal bundler (spec §4.3).
//!
//! Streaming, gap-based grouping of a time-sorted request stream,
//! partitioned by provider, parameterized by a gap threshold `W` (ms).

use crate::error::{Error, Result};
use crate::model::session::{RefinementOrigin, SessionFlags};
use crate::model::{Request, Session};
use std::collections::HashMap;

/// How to handle out-of-order timestamps within a provider partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPolicy {
    /// Reject with `InputOrderError` (spec §4.3 default).
    Reject,
    /// Pre-sort each partition by timestamp (stable) before bundling.
    PreSort,
}

/// Run the temporal bundler over `requests` with gap threshold `window_ms`.
///
/// Requests are partitioned by provider (cross-provider merging is
/// forbidden, spec §4.3 step 1); sessions are emitted in provider-ascending,
/// then start_ts-ascending order (spec §5 "Ordering guarantees").
pub fn bundle(requests: &[Request], window_ms: u64, order_policy: OrderPolicy) -> Result<Vec<Session>> {
    let mut partitions: HashMap<&str, Vec<&Request>> = HashMap::new();
    for r in requests {
        partitions.entry(r.provider.as_str()).or_default().push(r);
    }

    let mut providers: Vec<&str> = partitions.keys().copied().collect();
    providers.sort_unstable();

    let mut sessions = Vec::new();
    for provider in providers {
        let mut members = partitions.remove(provider).unwrap_or_default();

        match order_policy {
            OrderPolicy::Reject => {
                for w in members.windows(2) {
                    if w[1].timestamp_millis() < w[0].timestamp_millis() {
                        return Err(Error::InputOrder {
                            provider: provider.to_string(),
                            row: w[1].id as usize,
                        });
                    }
                }
            }
            OrderPolicy::PreSort => {
                members.sort_by_key(|r| r.timestamp_millis());
            }
        }

        sessions.extend(bundle_partition(provider, &members, window_ms));
    }

    sessions.sort_by(|a, b| a.provider.cmp(&b.provider).then(a.start_ts.cmp(&b.start_ts)));

    Ok(sessions)
}

fn bundle_partition(provider: &str, members: &[&Request], window_ms: u64) -> Vec<Session> {
    let mut sessions = Vec::new();
    let mut buffer: Vec<&Request> = Vec::new();
    let mut seq = 0usize;

    for &req in members {
        if let Some(last) = buffer.last() {
            let gap = req.timestamp_millis() - last.timestamp_millis();
            if gap > window_ms as i64 {
                sessions.push(emit_session(provider, &buffer, window_ms, seq));
                seq += 1;
                buffer.clear();
            }
        }
        buffer.push(req);
    }

    if !buffer.is_empty() {
        sessions.push(emit_session(provider, &buffer, window_ms, seq));
    }

    sessions
}

fn emit_session(provider: &str, members: &[&Request], window_ms: u64, seq: usize) -> Session {
    let start_ts = members[0].timestamp;
    let end_ts = members[members.len() - 1].timestamp;
    let request_ids = members.iter().map(|r| r.id).collect::<Vec<_>>();
    let size = request_ids.len();

    Session {
        session_id: format!("{provider}:{}:{seq}", start_ts.timestamp_millis()),
        provider: members[0].provider.clone(),
        start_ts,
        end_ts,
        request_ids,
        window_used: window_ms,
        refinement_origin: Some(RefinementOrigin::Initial),
        mibcs: None,
        flags: SessionFlags {
            singleton: size == 1,
            giant: false,
            low_coherence: false,
        },
    }
}
