//! The `OptScoreReport` final artifact (spec §3, §4.6).

use super::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The six weighted OptScore components (spec §4.6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Components {
    pub mibcs: f64,
    pub silhouette: f64,
    pub bps: f64,
    pub singleton_rate: f64,
    pub giant_rate: f64,
    pub thematic_variance: f64,
}

/// Confidence label for the recommended window (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Mean/stddev of OptScore across cross-validation folds for one candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FoldStats {
    pub mean: f64,
    pub stddev: f64,
    pub folds_won: usize,
    pub folds_evaluated: usize,
}

/// Metrics + support for one candidate window, possibly restricted to a
/// single provider's sub-population (spec §4.6 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderBreakdown {
    pub provider: Provider,
    pub session_count: usize,
    pub components: Components,
    pub opt_score: f64,
}

/// One row of the optimizer's ranked candidate table (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub window_ms: u64,
    pub session_count: usize,
    pub components: Components,
    pub opt_score: f64,
    pub fold_stats: Option<FoldStats>,
    pub per_provider: Vec<ProviderBreakdown>,
    /// Non-fatal warnings recorded for this candidate (spec §7).
    pub warnings: Vec<String>,
    /// Windows with insufficient session support are reported but excluded
    /// from selection (spec §4.6 "Failure semantics").
    pub excluded_from_selection: bool,
}

/// The final artifact emitted by the window optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptScoreReport {
    /// Sorted by OptScore descending, tie-break by window ascending
    /// (spec §5 "Ordering guarantees").
    pub candidates: Vec<CandidateResult>,
    /// `None` when every candidate failed support (spec §4.6
    /// "no_recommendation").
    pub recommended_window_ms: Option<u64>,
    pub confidence: Option<Confidence>,
    pub excluded_providers: Vec<Provider>,
    /// Providers excluded from per-provider metrics for lack of support
    /// (spec §7 `EmptyPartitionWarning`), keyed by provider label.
    pub low_support_providers: HashMap<String, usize>,
}

impl OptScoreReport {
    #[must_use]
    pub fn no_recommendation(excluded_providers: Vec<Provider>) -> Self {
        Self {
            candidates: Vec::new(),
            recommended_window_ms: None,
            confidence: None,
            excluded_providers,
            low_support_providers: HashMap::new(),
        }
    }
}
