//! Bundle metrics (spec §4.4): MIBCS, BPS, SingletonRate, GiantRate,
//! ThematicVariance, Silhouette.

use crate::config::Configuration;
use crate::embedding::EmbeddingMatrix;
use crate::model::report::Components;
use crate::model::Session;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;

/// Per-session MIBCS, aligned index-for-index with the sessions passed in.
/// `None` for sessions with fewer than 2 non-zero embedding rows.
#[must_use]
pub fn mibcs_per_session(
    sessions: &[Session],
    request_row: &HashMap<u64, usize>,
    matrix: &EmbeddingMatrix,
    max_pairs_sample_cap: usize,
    seed: u64,
) -> Vec<Option<f64>> {
    sessions
        .iter()
        .enumerate()
        .map(|(idx, s)| session_mibcs(s, request_row, matrix, max_pairs_sample_cap, seed.wrapping_add(idx as u64)))
        .collect()
}

fn session_mibcs(
    session: &Session,
    request_row: &HashMap<u64, usize>,
    matrix: &EmbeddingMatrix,
    sample_cap: usize,
    seed: u64,
) -> Option<f64> {
    mibcs_of_ids(&session.request_ids, request_row, matrix, sample_cap, seed)
}

/// Mean intra-bundle cosine similarity over an arbitrary set of request
/// ids (not necessarily a whole session) — used by the refiner to score
/// candidate components before deciding whether to accept a split.
#[must_use]
pub fn mibcs_of_ids(
    request_ids: &[u64],
    request_row: &HashMap<u64, usize>,
    matrix: &EmbeddingMatrix,
    sample_cap: usize,
    seed: u64,
) -> Option<f64> {
    let mut rows: Vec<usize> = request_ids
        .iter()
        .filter_map(|id| request_row.get(id).copied())
        .filter(|&row| !matrix.is_zero_row(row))
        .collect();

    if rows.len() < 2 {
        return None;
    }

    if rows.len() > sample_cap {
        let mut rng = StdRng::seed_from_u64(seed);
        rows.shuffle(&mut rng);
        rows.truncate(sample_cap);
        rows.sort_unstable();
    }

    let mut total = 0.0f64;
    let mut count = 0u64;
    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            total += f64::from(matrix.cosine(rows[i], rows[j]));
            count += 1;
        }
    }

    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

/// Aggregate MIBCS: unweighted mean of defined per-session values.
#[must_use]
pub fn aggregate_mibcs(per_session: &[Option<f64>]) -> f64 {
    let defined: Vec<f64> = per_session.iter().filter_map(|v| *v).collect();
    if defined.is_empty() {
        0.0
    } else {
        defined.iter().sum::<f64>() / defined.len() as f64
    }
}

/// Bundle Purity Score: fraction of sessions whose most-frequent first-two-
/// path-segment prefix accounts for >= 60% of members.
#[must_use]
pub fn bps(sessions: &[Session], path_of: &HashMap<u64, String>) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }

    let pure_count = sessions
        .iter()
        .filter(|s| {
            if s.request_ids.is_empty() {
                return false;
            }
            let mut counts: HashMap<String, usize> = HashMap::new();
            for id in &s.request_ids {
                let prefix = path_of.get(id).map(|p| url_prefix(p, 2)).unwrap_or_default();
                *counts.entry(prefix).or_insert(0) += 1;
            }
            let max = counts.values().copied().max().unwrap_or(0);
            (max as f64) / (s.request_ids.len() as f64) >= 0.6
        })
        .count();

    pure_count as f64 / sessions.len() as f64
}

/// The first `n` non-empty path segments, joined with `/`.
fn url_prefix(path: &str, n: usize) -> String {
    path.split('/').filter(|s| !s.is_empty()).take(n).collect::<Vec<_>>().join("/")
}

#[must_use]
pub fn singleton_rate(sessions: &[Session]) -> f64 {
    rate(sessions, |s| s.size() == 1)
}

#[must_use]
pub fn giant_rate(sessions: &[Session], giant_threshold: usize) -> f64 {
    rate(sessions, |s| s.size() > giant_threshold)
}

fn rate(sessions: &[Session], pred: impl Fn(&Session) -> bool) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }
    sessions.iter().filter(|s| pred(s)).count() as f64 / sessions.len() as f64
}

/// Mean over sessions of `(1 - MIBCS(s))`; singletons contribute 0.
#[must_use]
pub fn thematic_variance(sessions: &[Session], per_session_mibcs: &[Option<f64>]) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }
    let total: f64 = per_session_mibcs
        .iter()
        .map(|mibcs| mibcs.map_or(0.0, |m| 1.0 - m))
        .sum();
    total / sessions.len() as f64
}

/// Standard silhouette over the concatenated embedding rows, using session
/// id as the cluster label, averaged over requests (spec §4.4). Sampled
/// uniformly to at most `sample_cap` requests when the pass is larger.
#[must_use]
pub fn silhouette(
    sessions: &[Session],
    request_row: &HashMap<u64, usize>,
    matrix: &EmbeddingMatrix,
    sample_cap: usize,
    seed: u64,
) -> f64 {
    // session label per embedding row
    let mut label_of: HashMap<usize, usize> = HashMap::new();
    let mut members_of: Vec<Vec<usize>> = Vec::with_capacity(sessions.len());
    for (label, s) in sessions.iter().enumerate() {
        let rows: Vec<usize> = s.request_ids.iter().filter_map(|id| request_row.get(id).copied()).collect();
        for &row in &rows {
            label_of.insert(row, label);
        }
        members_of.push(rows);
    }

    let mut all_rows: Vec<usize> = label_of.keys().copied().collect();
    all_rows.sort_unstable();

    if all_rows.len() > sample_cap {
        let mut rng = StdRng::seed_from_u64(seed);
        all_rows.shuffle(&mut rng);
        all_rows.truncate(sample_cap);
        all_rows.sort_unstable();
    }

    if all_rows.is_empty() {
        return 0.0;
    }

    let mut total = 0.0f64;
    for &row in &all_rows {
        let own_label = label_of[&row];
        let own_members = &members_of[own_label];

        if own_members.len() < 2 || matrix.is_zero_row(row) {
            // singletons contribute 0
            continue;
        }

        let a = mean_cosine_distance(row, own_members, matrix);

        let mut b: Option<f64> = None;
        for (label, members) in members_of.iter().enumerate() {
            if label == own_label || members.is_empty() {
                continue;
            }
            let d = mean_cosine_distance(row, members, matrix);
            b = Some(b.map_or(d, |cur| cur.min(d)));
        }

        let b = b.unwrap_or(a);
        let denom = a.max(b);
        let s = if denom > 0.0 { (b - a) / denom } else { 0.0 };
        total += s;
    }

    total / all_rows.len() as f64
}

fn mean_cosine_distance(row: usize, members: &[usize], matrix: &EmbeddingMatrix) -> f64 {
    let others: Vec<usize> = members.iter().copied().filter(|&m| m != row).collect();
    if others.is_empty() {
        return 0.0;
    }
    let total: f64 = others.iter().map(|&m| 1.0 - f64::from(matrix.cosine(row, m))).sum();
    total / others.len() as f64
}

/// Finalize `session.mibcs` and `flags.{singleton,giant}` after bundling
/// and (optional) refinement, returning the per-session MIBCS values so
/// callers needn't recompute them for the aggregate metrics pass.
pub fn finalize_sessions(
    sessions: &mut [Session],
    request_row: &HashMap<u64, usize>,
    matrix: &EmbeddingMatrix,
    config: &Configuration,
    seed: u64,
) -> Vec<Option<f64>> {
    let per_session = mibcs_per_session(sessions, request_row, matrix, config.max_intra_bundle_pairs, seed);
    for (s, m) in sessions.iter_mut().zip(per_session.iter()) {
        s.mibcs = *m;
        s.flags.singleton = s.size() == 1;
        s.flags.giant = s.size() > config.giant_threshold;
    }
    per_session
}

/// Compute all six metric components for a set of sessions over a single
/// embedding pass.
#[must_use]
pub fn compute_components(
    sessions: &[Session],
    request_row: &HashMap<u64, usize>,
    path_of: &HashMap<u64, String>,
    matrix: &EmbeddingMatrix,
    config: &Configuration,
    seed: u64,
) -> Components {
    let per_session = mibcs_per_session(sessions, request_row, matrix, config.max_intra_bundle_pairs, seed);
    Components {
        mibcs: aggregate_mibcs(&per_session),
        silhouette: silhouette(sessions, request_row, matrix, config.silhouette_sample_cap, seed),
        bps: bps(sessions, path_of),
        singleton_rate: singleton_rate(sessions),
        giant_rate: giant_rate(sessions, config.giant_threshold),
        thematic_variance: thematic_variance(sessions, &per_session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::session::{RefinementOrigin, SessionFlags};
    use crate::model::Provider;
    use chrono::Utc;

    fn session(id: &str, request_ids: Vec<u64>) -> Session {
        let now = Utc::now();
        let size = request_ids.len();
        Session {
            session_id: id.to_string(),
            provider: Provider::new("OpenAI"),
            start_ts: now,
            end_ts: now,
            request_ids,
            window_used: 100,
            refinement_origin: Some(RefinementOrigin::Initial),
            mibcs: None,
            flags: SessionFlags {
                singleton: size == 1,
                giant: false,
                low_coherence: false,
            },
        }
    }

    #[test]
    fn singleton_rate_counts_size_one_sessions() {
        let sessions = vec![session("a", vec![1]), session("b", vec![2, 3])];
        assert!((singleton_rate(&sessions) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn giant_rate_uses_configured_threshold() {
        let sessions = vec![session("a", (0..10).collect()), session("b", vec![1])];
        assert!((giant_rate(&sessions, 5) - 0.5).abs() < 1e-9);
        assert!((giant_rate(&sessions, 50) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn mibcs_is_none_for_singleton() {
        let s = session("a", vec![1]);
        let request_row = HashMap::from([(1, 0)]);
        let matrix = EmbeddingMatrix::new(vec![vec![1.0, 0.0]]);
        assert!(session_mibcs(&s, &request_row, &matrix, 200, 0).is_none());
    }

    #[test]
    fn mibcs_averages_pairwise_cosine() {
        let s = session("a", vec![1, 2, 3]);
        let request_row = HashMap::from([(1, 0), (2, 1), (3, 2)]);
        let matrix = EmbeddingMatrix::new(vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]);
        let m = session_mibcs(&s, &request_row, &matrix, 200, 0).unwrap();
        // pairs: (0,1)=1.0, (0,2)=0.0, (1,2)=0.0 -> mean 1/3
        assert!((m - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn bps_detects_dominant_prefix() {
        let s = session("a", vec![1, 2, 3]);
        let path_of = HashMap::from([
            (1, "/api/weather/today".to_string()),
            (2, "/api/weather/tomorrow".to_string()),
            (3, "/api/stocks/aapl".to_string()),
        ]);
        let score = bps(&[s], &path_of);
        assert!((score - 1.0).abs() < 1e-9, "2/3 share /api/weather prefix, >= 60%");
    }

    #[test]
    fn thematic_variance_is_one_minus_mibcs() {
        let per_session = vec![Some(0.8), None];
        let sessions = vec![session("a", vec![1, 2]), session("b", vec![3])];
        let tv = thematic_variance(&sessions, &per_session);
        assert!((tv - 0.1).abs() < 1e-9);
    }

    #[test]
    fn cosine_bound_invariant_on_mibcs() {
        let s = session("a", vec![1, 2]);
        let request_row = HashMap::from([(1, 0), (2, 1)]);
        let matrix = EmbeddingMatrix::new(vec![vec![1.0, 0.0], vec![-1.0, 0.0]]);
        let m = session_mibcs(&s, &request_row, &matrix, 200, 0).unwrap();
        assert!((-1.0..=1.0).contains(&m));
    }
}
