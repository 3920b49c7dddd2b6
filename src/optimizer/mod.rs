//! Window optimizer (spec §4.6): sweeps candidate gap thresholds, runs the
//! bundler → embedder → refiner → metrics pipeline once per candidate,
//! computes `OptScore`, cross-validates over temporal folds, and emits a
//! confidence-rated recommendation.
//!
//! Parallelism follows spec §5: batch, parallel across candidate windows
//! and folds, sequential within a single `(W, fold)` evaluation. Tasks are
//! independent and share only the read-only request snapshot; `rayon`
//! drives the fan-out (adopted from the pack's `mcp_agent_mail_rust`
//! workspace, which uses `rayon` for exactly this kind of data-parallel
//! sweep). Seeded sampling (silhouette, giant-bundle MIBCS, fold
//! partitioning) goes through `rand::rngs::StdRng::seed_from_u64` so two
//! runs with identical input/config/seed are bit-identical (spec §5, §8
//! invariant 5).

use crate::bundler::{self, OrderPolicy};
use crate::config::Configuration;
use crate::embedding::tfidf::{self, TfIdfBackend};
use crate::embedding::{EmbeddingBackend, EmbeddingMatrix};
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::report::{CandidateResult, Components, Confidence, FoldStats, OptScoreReport, ProviderBreakdown};
use crate::model::{Provider, Request, Session};
use crate::refiner;
use crate::tokenizer;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "transformer")]
use crate::embedding::transformer::{TransformerBackend, TransformerConfig};

/// The outcome of running the full pipeline once for a single `(window,
/// request subset)` pair.
struct EvalOutput {
    session_count: usize,
    components: Components,
    opt_score: f64,
    per_provider: Vec<ProviderBreakdown>,
    warnings: Vec<String>,
    excluded: bool,
}

/// Run the window optimizer over `requests`.
///
/// `requests` need not be pre-sorted; the engine sorts internally (spec
/// §3 invariant). `cancel`, if provided, is polled cooperatively at the
/// entry of every `(window, fold)` task; once set, in-flight tasks finish
/// their current evaluation and no further task starts, then the whole
/// run aborts with `Error::Cancelled` (spec §5: "cancellation between
/// evaluations leaves no partial session in the sink").
///
/// # Errors
///
/// Returns `Error::Config` if `config` fails validation, or
/// `Error::Cancelled` if `cancel` was observed set.
pub fn optimize(requests: &[Request], config: &Configuration, cancel: Option<Arc<AtomicBool>>) -> Result<OptScoreReport> {
    config.validate()?;
    let cancel = cancel.unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    let exclude = config.exclude_set();
    let mut included: Vec<Request> = requests.iter().filter(|r| !r.provider.is_excluded(&exclude)).cloned().collect();

    if included.is_empty() {
        return Ok(OptScoreReport::no_recommendation(config.exclude_providers.clone()));
    }

    included.sort_by_key(Request::timestamp_millis);

    let mut provider_counts: HashMap<String, usize> = HashMap::new();
    for r in &included {
        *provider_counts.entry(r.provider.as_str().to_string()).or_insert(0) += 1;
    }
    let mut low_support_providers: HashMap<String, usize> = HashMap::new();
    let mut low_support_set: HashSet<String> = HashSet::new();
    for (provider, count) in &provider_counts {
        if *count < config.min_partition_support {
            low_support_providers.insert(provider.clone(), *count);
            low_support_set.insert(provider.clone());
            tracing::warn!(provider, count, "EmptyPartitionWarning: provider excluded from per-provider metrics");
        }
    }

    let folds = temporal_folds(&included, config.folds);
    let windows = &config.candidate_windows_ms;

    // Full-corpus evaluation per candidate window, used for the headline
    // CandidateResult row.
    let full_outputs: Vec<EvalOutput> = (0..windows.len())
        .into_par_iter()
        .map(|wi| -> Result<EvalOutput> {
            let window_ms = windows[wi];
            let seed = config.seed.wrapping_add(window_ms);
            evaluate(&included, window_ms, config, seed, &low_support_set, &cancel)
        })
        .collect::<Result<Vec<_>>>()?;

    // Per-`(window, fold)` evaluation, used for cross-validated fold
    // statistics and the argmax-per-fold confidence vote.
    let tasks: Vec<(usize, usize)> = (0..windows.len()).flat_map(|wi| (0..folds.len()).map(move |fi| (wi, fi))).collect();
    let fold_outputs: Vec<EvalOutput> = tasks
        .par_iter()
        .map(|&(wi, fi)| -> Result<EvalOutput> {
            let window_ms = windows[wi];
            let seed = config.seed.wrapping_add(window_ms).wrapping_add(fi as u64 * 7919);
            evaluate(&folds[fi], window_ms, config, seed, &low_support_set, &cancel)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut fold_scores_by_window: HashMap<u64, Vec<f64>> = HashMap::new();
    for (&(wi, _fi), out) in tasks.iter().zip(fold_outputs.iter()) {
        let window_ms = windows[wi];
        fold_scores_by_window.entry(window_ms).or_default().push(out.opt_score);
    }

    // Argmax-per-fold vote: which window won each fold (ties broken by
    // smallest window, matching the table's deterministic tie-break).
    // `tasks` is built as (window, fold) pairs in row-major order, so task
    // index `wi * folds.len() + fi` addresses the (wi, fi) evaluation.
    let mut folds_won: HashMap<u64, usize> = HashMap::new();
    for fi in 0..folds.len() {
        let mut best: Option<(u64, f64)> = None;
        for (wi, &window_ms) in windows.iter().enumerate() {
            let score = fold_outputs[wi * folds.len() + fi].opt_score;
            if !score.is_finite() {
                continue;
            }
            best = Some(match best {
                Some((bw, bs)) if bs > score || (bs == score && bw <= window_ms) => (bw, bs),
                _ => (window_ms, score),
            });
        }
        if let Some((winner, _)) = best {
            *folds_won.entry(winner).or_insert(0) += 1;
        }
    }

    let candidates: Vec<CandidateResult> = windows
        .iter()
        .enumerate()
        .map(|(wi, &window_ms)| {
            let full = &full_outputs[wi];
            let fold_values = fold_scores_by_window.get(&window_ms).cloned().unwrap_or_default();
            let finite: Vec<f64> = fold_values.into_iter().filter(|v| v.is_finite()).collect();
            let (mean, stddev) = mean_stddev(&finite);
            CandidateResult {
                window_ms,
                session_count: full.session_count,
                components: full.components,
                opt_score: full.opt_score,
                fold_stats: Some(FoldStats {
                    mean,
                    stddev,
                    folds_won: folds_won.get(&window_ms).copied().unwrap_or(0),
                    folds_evaluated: finite.len(),
                }),
                per_provider: full.per_provider.clone(),
                warnings: full.warnings.clone(),
                excluded_from_selection: full.excluded,
            }
        })
        .collect();

    let (recommended_window_ms, confidence) = select_recommendation(&candidates, folds.len());

    let mut candidates = candidates;
    candidates.sort_by(|a, b| {
        b.opt_score.partial_cmp(&a.opt_score).unwrap_or(std::cmp::Ordering::Equal).then(a.window_ms.cmp(&b.window_ms))
    });

    Ok(OptScoreReport {
        candidates,
        recommended_window_ms,
        confidence,
        excluded_providers: config.exclude_providers.clone(),
        low_support_providers,
    })
}

/// Select `W*` and its confidence label from the (unsorted) candidate
/// table (spec §4.6 "Selection and confidence").
fn select_recommendation(candidates: &[CandidateResult], fold_count: usize) -> (Option<u64>, Option<Confidence>) {
    let mut eligible: Vec<&CandidateResult> = candidates.iter().filter(|c| !c.excluded_from_selection).collect();
    eligible.sort_by(|a, b| b.opt_score.partial_cmp(&a.opt_score).unwrap_or(std::cmp::Ordering::Equal).then(a.window_ms.cmp(&b.window_ms)));

    let Some(winner) = eligible.first() else {
        return (None, None);
    };

    let runner_up = eligible.get(1);
    let folds_won = winner.fold_stats.map_or(0, |f| f.folds_won);
    let stddev = winner.fold_stats.map_or(0.0, |f| f.stddev);

    let all_folds_won = folds_won == fold_count && fold_count > 0;
    let margin_clears = runner_up.is_none_or(|r| winner.opt_score - r.opt_score > 2.0 * stddev);

    let confidence = if all_folds_won && margin_clears {
        Confidence::High
    } else if folds_won >= fold_count.div_ceil(2) {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    (Some(winner.window_ms), Some(confidence))
}

/// Run the bundler (and, if enabled, the refiner) once at `window_ms` and
/// return the emitted sessions — used by the CLI driver to materialize
/// the winning candidate's sessions for the sink after `optimize` has
/// picked `W*` (spec §1: "the core... emits session rows via an abstract
/// sink"; the `OptScoreReport` itself carries metrics, not session rows).
///
/// # Errors
///
/// Returns `Error::InputOrder` if a provider partition is out of order
/// (unreachable when the caller passes the same requests `optimize` saw,
/// since this function re-sorts internally).
pub fn sessions_for_window(requests: &[Request], window_ms: u64, config: &Configuration) -> Result<Vec<Session>> {
    let exclude = config.exclude_set();
    let mut included: Vec<Request> = requests.iter().filter(|r| !r.provider.is_excluded(&exclude)).cloned().collect();
    included.sort_by_key(Request::timestamp_millis);

    let mut sessions = bundler::bundle(&included, window_ms, OrderPolicy::Reject)?;

    let request_row: HashMap<u64, usize> = included.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let timestamp_of: HashMap<u64, i64> = included.iter().map(|r| (r.id, r.timestamp_millis())).collect();
    let token_lists: Vec<Vec<String>> = included.iter().map(tokenizer::tokenize_raw).collect();
    let matrix = build_matrix(&token_lists, config);

    if config.refinement_enabled {
        sessions = refiner::refine(sessions, &request_row, &timestamp_of, &matrix, config, config.seed.wrapping_add(window_ms));
    }

    metrics::finalize_sessions(&mut sessions, &request_row, &matrix, config, config.seed.wrapping_add(window_ms));
    Ok(sessions)
}

/// Split a timestamp-sorted request slice into `k` contiguous temporal
/// folds (spec §4.6 "Cross-validation"). Folds may be empty if `k`
/// exceeds the corpus size.
fn temporal_folds(sorted: &[Request], k: usize) -> Vec<Vec<Request>> {
    let n = sorted.len();
    (0..k)
        .map(|i| {
            let start = n * i / k;
            let end = n * (i + 1) / k;
            sorted[start..end].to_vec()
        })
        .collect()
}

/// Run bundler → embedder → refiner → metrics once over `requests` at
/// `window_ms`, returning the aggregate and per-provider components.
fn evaluate(
    requests: &[Request],
    window_ms: u64,
    config: &Configuration,
    seed: u64,
    low_support_providers: &HashSet<String>,
    cancel: &AtomicBool,
) -> Result<EvalOutput> {
    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    let mut warnings = Vec::new();

    let mut sessions = bundler::bundle(requests, window_ms, OrderPolicy::Reject)?;

    let request_row: HashMap<u64, usize> = requests.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let path_of: HashMap<u64, String> = requests.iter().map(|r| (r.id, r.path.clone())).collect();
    let timestamp_of: HashMap<u64, i64> = requests.iter().map(|r| (r.id, r.timestamp_millis())).collect();
    let token_lists: Vec<Vec<String>> = requests.iter().map(tokenizer::tokenize_raw).collect();

    if tfidf::vocabulary_is_empty(&token_lists) {
        let reason = "no usable tokens in corpus".to_string();
        warnings.push(Error::EmbeddingDegenerate { reason: reason.clone() }.to_string());
        tracing::warn!(window_ms, reason, "EmbeddingDegenerate");
        return Ok(EvalOutput {
            session_count: sessions.len(),
            components: Components::default(),
            opt_score: f64::NEG_INFINITY,
            per_provider: Vec::new(),
            warnings,
            excluded: true,
        });
    }

    let matrix = build_matrix(&token_lists, config);

    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    if config.refinement_enabled {
        sessions = refiner::refine(sessions, &request_row, &timestamp_of, &matrix, config, seed);
    }

    metrics::finalize_sessions(&mut sessions, &request_row, &matrix, config, seed);

    let session_count = sessions.len();
    if session_count < config.min_session_support {
        let warning = Error::LowSupport { window_ms, session_count }.to_string();
        tracing::warn!(window_ms, session_count, "LowSupportWarning");
        warnings.push(warning);
    }

    let components = metrics::compute_components(&sessions, &request_row, &path_of, &matrix, config, seed);
    let opt_score = opt_score(&components, config);
    let per_provider = per_provider_breakdown(&sessions, &request_row, &path_of, &matrix, config, seed, low_support_providers);

    tracing::debug!(window_ms, session_count, opt_score, "evaluated candidate window");

    Ok(EvalOutput {
        session_count,
        components,
        opt_score,
        per_provider,
        warnings,
        excluded: session_count < config.min_session_support,
    })
}

fn build_matrix(token_lists: &[Vec<String>], config: &Configuration) -> EmbeddingMatrix {
    use crate::config::EmbeddingBackendKind;
    match config.embedding_backend {
        EmbeddingBackendKind::Tfidf => TfIdfBackend.embed(token_lists),
        EmbeddingBackendKind::Transformer => {
            #[cfg(feature = "transformer")]
            {
                TransformerBackend::new(TransformerConfig::default()).embed(token_lists)
            }
            #[cfg(not(feature = "transformer"))]
            {
                tracing::warn!("transformer backend selected but the `transformer` feature is not enabled; falling back to tfidf");
                TfIdfBackend.embed(token_lists)
            }
        }
    }
}

/// `OptScore(W) = a*MIBCS + b*Silhouette + c*BPS - d*SingletonRate - e*GiantRate - f*ThematicVariance`
/// (spec §4.6, default weights a=0.30 b=0.25 c=0.25 d=0.10 e=0.05 f=0.05).
fn opt_score(components: &Components, config: &Configuration) -> f64 {
    let w = &config.opt_score_weights;
    w.alpha * components.mibcs + w.beta * components.silhouette + w.gamma * components.bps
        - w.delta * components.singleton_rate
        - w.epsilon * components.giant_rate
        - w.zeta * components.thematic_variance
}

fn per_provider_breakdown(
    sessions: &[Session],
    request_row: &HashMap<u64, usize>,
    path_of: &HashMap<u64, String>,
    matrix: &EmbeddingMatrix,
    config: &Configuration,
    seed: u64,
    low_support_providers: &HashSet<String>,
) -> Vec<ProviderBreakdown> {
    let mut by_provider: HashMap<String, Vec<Session>> = HashMap::new();
    for s in sessions {
        if low_support_providers.contains(s.provider.as_str()) {
            continue;
        }
        by_provider.entry(s.provider.as_str().to_string()).or_default().push(s.clone());
    }

    let mut providers: Vec<String> = by_provider.keys().cloned().collect();
    providers.sort();

    providers
        .into_iter()
        .map(|provider_label| {
            let subset = &by_provider[&provider_label];
            let components = metrics::compute_components(subset, request_row, path_of, matrix, config, seed);
            let score = opt_score(&components, config);
            ProviderBreakdown {
                provider: Provider::new(provider_label),
                session_count: subset.len(),
                components,
                opt_score: score,
            }
        })
        .collect()
}

/// Population mean and standard deviation of `values`; `(0.0, 0.0)` for an
/// empty slice.
fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}
