//! Session refiner (spec §4.5): splits collision bundles using a
//! similarity graph and connected-component analysis.
//!
//! A candidate collision is a session whose size is at least
//! `min_bundle_size` and whose MIBCS falls below `coherence_floor`. Such a
//! session is modeled as an undirected graph over its members (edge iff
//! cosine >= `similarity_threshold`); components of size < `min_sub_bundle_size`
//! are held aside as residual and re-attached to the nearest remaining
//! component afterward. The split is accepted only if it improves the
//! weighted-mean MIBCS by at least `min_mibcs_improvement`.
//!
//! IP-based refinement is disabled by default (spec §4.5: intra-bundle IP
//! diversity correlates only weakly, r ~= 0.023, with collision status);
//! `Configuration::ip_refinement_enabled` is carried as a toggle but the
//! default pathway never inspects `client_ip`.

use crate::config::Configuration;
use crate::embedding::EmbeddingMatrix;
use crate::metrics::mibcs_of_ids;
use crate::model::session::{RefinementOrigin, SessionFlags};
use crate::model::Session;
use std::collections::HashMap;

/// Union-find over a session's local member indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Run the session refiner over a bundler's output.
///
/// `request_row` maps request id to embedding-matrix row; `timestamp_of`
/// maps request id to millisecond timestamp, needed to compute child
/// sessions' `start_ts`/`end_ts` after a split. Sessions that are not
/// collision candidates, or whose split is rejected, pass through with
/// `flags.low_coherence` set appropriately; accepted splits replace the
/// parent with its emitted children (spec §4.5, invariant 4: refinement
/// conservation).
#[must_use]
pub fn refine(
    sessions: Vec<Session>,
    request_row: &HashMap<u64, usize>,
    timestamp_of: &HashMap<u64, i64>,
    matrix: &EmbeddingMatrix,
    config: &Configuration,
    seed: u64,
) -> Vec<Session> {
    let mut out = Vec::with_capacity(sessions.len());
    for (idx, session) in sessions.into_iter().enumerate() {
        let session_seed = seed.wrapping_add(idx as u64 * 104_729);
        out.extend(refine_one(session, request_row, timestamp_of, matrix, config, session_seed));
    }
    out
}

fn refine_one(
    mut session: Session,
    request_row: &HashMap<u64, usize>,
    timestamp_of: &HashMap<u64, i64>,
    matrix: &EmbeddingMatrix,
    config: &Configuration,
    seed: u64,
) -> Vec<Session> {
    if session.size() < config.min_bundle_size {
        return vec![session];
    }

    let Some(parent_mibcs) = mibcs_of_ids(&session.request_ids, request_row, matrix, config.max_intra_bundle_pairs, seed)
    else {
        return vec![session];
    };

    if parent_mibcs >= config.coherence_floor {
        session.mibcs = Some(parent_mibcs);
        return vec![session];
    }

    match try_split(&session, request_row, matrix, config, parent_mibcs, seed) {
        Some(children) => build_child_sessions(&session, children, timestamp_of),
        None => {
            session.mibcs = Some(parent_mibcs);
            session.flags.low_coherence = true;
            vec![session]
        }
    }
}

/// Attempt to split `session`'s members into accepted connected components.
/// Returns `None` if fewer than 2 large components remain, or the
/// weighted-mean MIBCS improvement doesn't clear the configured bar.
fn try_split(
    session: &Session,
    request_row: &HashMap<u64, usize>,
    matrix: &EmbeddingMatrix,
    config: &Configuration,
    parent_mibcs: f64,
    seed: u64,
) -> Option<Vec<Vec<u64>>> {
    let members = &session.request_ids;
    let n = members.len();
    let rows: Vec<Option<usize>> = members.iter().map(|id| request_row.get(id).copied()).collect();

    let mut uf = UnionFind::new(n);
    for i in 0..n {
        let Some(ri) = rows[i] else { continue };
        for j in (i + 1)..n {
            let Some(rj) = rows[j] else { continue };
            if matrix.cosine(ri, rj) >= config.similarity_threshold as f32 {
                uf.union(i, j);
            }
        }
    }

    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        components.entry(uf.find(i)).or_default().push(i);
    }

    let mut large: Vec<Vec<usize>> = Vec::new();
    let mut residual: Vec<usize> = Vec::new();
    let mut roots: Vec<usize> = components.keys().copied().collect();
    roots.sort_unstable();
    for root in roots {
        let indices = components.remove(&root).unwrap_or_default();
        if indices.len() >= config.min_sub_bundle_size {
            large.push(indices);
        } else {
            residual.extend(indices);
        }
    }

    if large.len() < 2 {
        return None;
    }

    let mut component_ids: Vec<Vec<u64>> = large
        .iter()
        .map(|indices| indices.iter().map(|&i| members[i]).collect())
        .collect();

    let component_mibcs: Vec<f64> = component_ids
        .iter()
        .map(|ids| mibcs_of_ids(ids, request_row, matrix, config.max_intra_bundle_pairs, seed).unwrap_or(0.0))
        .collect();

    let total_size: usize = component_ids.iter().map(Vec::len).sum();
    let weighted_mean: f64 = component_ids
        .iter()
        .zip(component_mibcs.iter())
        .map(|(ids, mibcs)| mibcs * ids.len() as f64 / total_size as f64)
        .sum();

    if weighted_mean <= parent_mibcs + config.min_mibcs_improvement {
        return None;
    }

    // Attach residual members to the large component with the highest mean
    // cosine to that component's members (spec §4.5 step 5).
    for &idx in &residual {
        let row = rows[idx];
        let best = component_ids
            .iter()
            .enumerate()
            .map(|(ci, ids)| (ci, mean_cosine_to_ids(row, ids, request_row, matrix)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(ci, _)| ci)
            .unwrap_or(0);
        component_ids[best].push(members[idx]);
    }

    Some(component_ids)
}

fn mean_cosine_to_ids(
    row: Option<usize>,
    ids: &[u64],
    request_row: &HashMap<u64, usize>,
    matrix: &EmbeddingMatrix,
) -> f64 {
    let Some(row) = row else { return 0.0 };
    let others: Vec<usize> = ids.iter().filter_map(|id| request_row.get(id).copied()).collect();
    if others.is_empty() {
        return 0.0;
    }
    let total: f64 = others.iter().map(|&o| f64::from(matrix.cosine(row, o))).sum();
    total / others.len() as f64
}

fn build_child_sessions(parent: &Session, children: Vec<Vec<u64>>, timestamp_of: &HashMap<u64, i64>) -> Vec<Session> {
    children
        .into_iter()
        .enumerate()
        .map(|(child_idx, mut request_ids)| {
            request_ids.sort_by_key(|id| timestamp_of.get(id).copied().unwrap_or(0));
            let start_millis = request_ids.first().and_then(|id| timestamp_of.get(id)).copied().unwrap_or(0);
            let end_millis = request_ids.last().and_then(|id| timestamp_of.get(id)).copied().unwrap_or(0);
            let size = request_ids.len();

            Session {
                session_id: format!("{}:split{child_idx}", parent.session_id),
                provider: parent.provider.clone(),
                start_ts: chrono::DateTime::from_timestamp_millis(start_millis).unwrap_or(parent.start_ts),
                end_ts: chrono::DateTime::from_timestamp_millis(end_millis).unwrap_or(parent.end_ts),
                request_ids,
                window_used: parent.window_used,
                refinement_origin: Some(RefinementOrigin::SplitFrom(parent.session_id.clone())),
                mibcs: None,
                flags: SessionFlags {
                    singleton: size == 1,
                    giant: false,
                    low_coherence: false,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::session::RefinementOrigin as RO;
    use crate::model::Provider;
    use chrono::{TimeZone, Utc};

    fn session(ids: Vec<u64>) -> Session {
        let now = Utc.timestamp_millis_opt(0).unwrap();
        let size = ids.len();
        Session {
            session_id: "OpenAI:0:0".to_string(),
            provider: Provider::new("OpenAI"),
            start_ts: now,
            end_ts: now,
            request_ids: ids,
            window_used: 100,
            refinement_origin: Some(RO::Initial),
            mibcs: None,
            flags: SessionFlags {
                singleton: size == 1,
                giant: false,
                low_coherence: false,
            },
        }
    }

    /// Scenario D — refinement splits a collision: two disjoint themes
    /// merged by temporal proximity split into two coherent sub-bundles.
    #[test]
    fn scenario_d_refinement_splits_a_collision() {
        let ids: Vec<u64> = (0..6).collect();
        let s = session(ids.clone());

        // weather cluster: 0,1,2 ; stocks cluster: 3,4,5
        let mut rows = vec![vec![0.0f32; 2]; 6];
        for i in 0..3 {
            rows[i] = vec![1.0, 0.0];
        }
        for i in 3..6 {
            rows[i] = vec![0.0, 1.0];
        }
        let matrix = EmbeddingMatrix::new(rows);
        let request_row: HashMap<u64, usize> = ids.iter().map(|&id| (id, id as usize)).collect();
        let timestamp_of: HashMap<u64, i64> = ids.iter().map(|&id| (id, id as i64)).collect();

        let config = Configuration::default();
        let result = refine(vec![s], &request_row, &timestamp_of, &matrix, &config, 0);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].size(), 3);
        assert_eq!(result[1].size(), 3);
        for child in &result {
            assert!(matches!(child.refinement_origin, Some(RO::SplitFrom(_))));
        }
    }

    /// Invariant: refinement conservation — union of child request_ids
    /// equals the parent's, counts preserved.
    #[test]
    fn invariant_refinement_conservation() {
        let ids: Vec<u64> = (0..6).collect();
        let s = session(ids.clone());

        let mut rows = vec![vec![0.0f32; 2]; 6];
        for i in 0..3 {
            rows[i] = vec![1.0, 0.0];
        }
        for i in 3..6 {
            rows[i] = vec![0.0, 1.0];
        }
        let matrix = EmbeddingMatrix::new(rows);
        let request_row: HashMap<u64, usize> = ids.iter().map(|&id| (id, id as usize)).collect();
        let timestamp_of: HashMap<u64, i64> = ids.iter().map(|&id| (id, id as i64)).collect();

        let config = Configuration::default();
        let result = refine(vec![s], &request_row, &timestamp_of, &matrix, &config, 0);

        let mut seen: Vec<u64> = result.iter().flat_map(|s| s.request_ids.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, ids);
    }

    #[test]
    fn small_sessions_pass_through_unsplit() {
        let s = session(vec![1, 2]);
        let matrix = EmbeddingMatrix::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let request_row: HashMap<u64, usize> = HashMap::from([(1, 0), (2, 1)]);
        let timestamp_of: HashMap<u64, i64> = HashMap::from([(1, 0), (2, 1)]);

        let config = Configuration::default();
        let result = refine(vec![s], &request_row, &timestamp_of, &matrix, &config, 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].size(), 2);
    }

    #[test]
    fn coherent_sessions_are_not_split() {
        let ids: Vec<u64> = (0..4).collect();
        let s = session(ids.clone());
        let rows = vec![vec![1.0f32, 0.0]; 4];
        let matrix = EmbeddingMatrix::new(rows);
        let request_row: HashMap<u64, usize> = ids.iter().map(|&id| (id, id as usize)).collect();
        let timestamp_of: HashMap<u64, i64> = ids.iter().map(|&id| (id, id as i64)).collect();

        let config = Configuration::default();
        let result = refine(vec![s], &request_row, &timestamp_of, &matrix, &config, 0);
        assert_eq!(result.len(), 1);
        assert!((result[0].mibcs.unwrap() - 1.0).abs() < 1e-9);
        assert!(!result[0].flags.low_coherence);
    }

    #[test]
    fn rejected_split_keeps_parent_flagged_low_coherence() {
        // Members form one big low-similarity blob with no distinct
        // clusters: every pair below the similarity threshold, so no
        // edges form and every node is its own singleton component —
        // fewer than min_sub_bundle_size members each, so no split.
        let ids: Vec<u64> = (0..4).collect();
        let s = session(ids.clone());
        let rows = vec![
            vec![1.0f32, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ];
        let matrix = EmbeddingMatrix::new(rows);
        let request_row: HashMap<u64, usize> = ids.iter().map(|&id| (id, id as usize)).collect();
        let timestamp_of: HashMap<u64, i64> = ids.iter().map(|&id| (id, id as i64)).collect();

        let mut config = Configuration::default();
        config.min_bundle_size = 3;
        let result = refine(vec![s], &request_row, &timestamp_of, &matrix, &config, 0);
        assert_eq!(result.len(), 1);
        assert!(result[0].flags.low_coherence);
    }
}
