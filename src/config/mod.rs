//! Engine configuration (spec §6).
//!
//! Loaded from a JSON file via `serde_json`, with a small set of
//! environment-variable overrides for the values operators tune most
//! often (`QFOS_SEED`, `QFOS_FOLDS`).

use crate::error::{Error, Result};
use crate::model::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// The six `OptScore` weights, α through ζ (spec §4.6, §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OptScoreWeights {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub epsilon: f64,
    pub zeta: f64,
}

impl Default for OptScoreWeights {
    fn default() -> Self {
        Self {
            alpha: 0.30,
            beta: 0.25,
            gamma: 0.25,
            delta: 0.10,
            epsilon: 0.05,
            zeta: 0.05,
        }
    }
}

/// Which embedding backend to use (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackendKind {
    Tfidf,
    Transformer,
}

impl Default for EmbeddingBackendKind {
    fn default() -> Self {
        Self::Tfidf
    }
}

/// Engine configuration (spec §6, enumerated with defaults in brackets).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub candidate_windows_ms: Vec<u64>,
    pub opt_score_weights: OptScoreWeights,
    pub giant_threshold: usize,
    pub singleton_size: usize,
    pub coherence_floor: f64,
    pub similarity_threshold: f64,
    pub min_bundle_size: usize,
    pub min_sub_bundle_size: usize,
    pub min_mibcs_improvement: f64,
    pub refinement_enabled: bool,
    pub ip_refinement_enabled: bool,
    pub embedding_backend: EmbeddingBackendKind,
    pub max_intra_bundle_pairs: usize,
    pub folds: usize,
    pub silhouette_sample_cap: usize,
    pub seed: u64,
    pub exclude_providers: Vec<Provider>,
    pub min_session_support: usize,
    pub min_partition_support: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            candidate_windows_ms: vec![50, 100, 500, 1000, 3000, 5000],
            opt_score_weights: OptScoreWeights::default(),
            giant_threshold: 50,
            singleton_size: 1,
            coherence_floor: 0.5,
            similarity_threshold: 0.5,
            min_bundle_size: 3,
            min_sub_bundle_size: 2,
            min_mibcs_improvement: 0.05,
            refinement_enabled: true,
            ip_refinement_enabled: false,
            embedding_backend: EmbeddingBackendKind::Tfidf,
            max_intra_bundle_pairs: 200,
            folds: 5,
            silhouette_sample_cap: 5000,
            seed: 0,
            exclude_providers: vec![Provider::new("Microsoft"), Provider::new("Bing")],
            min_session_support: 10,
            min_partition_support: 10,
        }
    }
}

impl Configuration {
    /// Load configuration from a JSON file, falling back to defaults for
    /// any field the file omits, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply the handful of environment-variable overrides the teacher's
    /// config convention uses: env first, file as fallback.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(seed) = std::env::var("QFOS_SEED") {
            if let Ok(seed) = seed.parse() {
                self.seed = seed;
            }
        }
        if let Ok(folds) = std::env::var("QFOS_FOLDS") {
            if let Ok(folds) = folds.parse() {
                self.folds = folds;
            }
        }
    }

    /// Validate configuration invariants, returning `ConfigError` on the
    /// first violation found (spec §7).
    pub fn validate(&self) -> Result<()> {
        if self.candidate_windows_ms.is_empty() {
            return Err(Error::Config("candidate_windows_ms must not be empty".to_string()));
        }
        if self.candidate_windows_ms.iter().any(|&w| w == 0) {
            return Err(Error::Config("candidate window values must be positive".to_string()));
        }

        let weights = [
            self.opt_score_weights.alpha,
            self.opt_score_weights.beta,
            self.opt_score_weights.gamma,
            self.opt_score_weights.delta,
            self.opt_score_weights.epsilon,
            self.opt_score_weights.zeta,
        ];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(Error::Config("opt_score_weights must be non-negative".to_string()));
        }

        if !(0.0..=1.0).contains(&self.coherence_floor) {
            return Err(Error::Config("coherence_floor must be in [0, 1]".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config("similarity_threshold must be in [-1, 1]".to_string()));
        }
        if self.min_sub_bundle_size == 0 {
            return Err(Error::Config("min_sub_bundle_size must be positive".to_string()));
        }
        if self.folds == 0 {
            return Err(Error::Config("folds must be positive".to_string()));
        }
        if self.giant_threshold == 0 {
            return Err(Error::Config("giant_threshold must be positive".to_string()));
        }

        Ok(())
    }

    #[must_use]
    pub fn exclude_set(&self) -> HashSet<Provider> {
        self.exclude_providers.iter().cloned().collect()
    }
}
