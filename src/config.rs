//! Pipeline configuration: compiled defaults, overlaid by an optional config
//! file, overlaid by `VODIC_*` environment variables.
//!
//! Resolution order (later wins):
//! 1. [`PipelineConfig::default`]
//! 2. A config file loaded via [`ConfigBuilder::with_file`]
//! 3. Environment variables via [`ConfigBuilder::with_env`]

use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::RagError;

/// Weights and thresholds for the retriever's soft-penalty scoring.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PenaltyWeights {
    /// Maximum multiplicative penalty for a `price_max` overshoot.
    #[validate(range(min = 0.0, max = 1.0))]
    pub price_overshoot_max_penalty: f32,
    /// Penalty for an adjacent-month mismatch.
    #[validate(range(min = 0.0, max = 1.0))]
    pub month_adjacent_penalty: f32,
    /// Penalty for a non-adjacent-month mismatch.
    #[validate(range(min = 0.0, max = 1.0))]
    pub month_distant_penalty: f32,
    /// Maximum penalty for a `duration_days` mismatch.
    #[validate(range(min = 0.0, max = 1.0))]
    pub duration_max_penalty: f32,
    /// Penalty when `category` mismatches and wasn't used as the hard filter.
    #[validate(range(min = 0.0, max = 1.0))]
    pub category_mismatch_penalty: f32,
    /// Penalty for a `family_friendly` conflict.
    #[validate(range(min = 0.0, max = 1.0))]
    pub family_friendly_conflict_penalty: f32,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            price_overshoot_max_penalty: 0.5,
            month_adjacent_penalty: 0.7,
            month_distant_penalty: 0.4,
            duration_max_penalty: 0.5,
            category_mismatch_penalty: 0.7,
            family_friendly_conflict_penalty: 0.6,
        }
    }
}

/// Per-stage deadlines in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StageTimeouts {
    #[validate(range(min = 1))]
    pub embedding_ms: u64,
    #[validate(range(min = 1))]
    pub completion_ms: u64,
    #[validate(range(min = 1))]
    pub vector_search_ms: u64,
    #[validate(range(min = 1))]
    pub persistence_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            embedding_ms: 5_000,
            completion_ms: 30_000,
            vector_search_ms: 5_000,
            persistence_ms: 2_000,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Target chunk size in tokens.
    #[validate(range(min = 32))]
    pub chunk_max_tokens: usize,
    /// Overlap fraction between consecutive chunk windows, e.g. 0.2 = 20%.
    #[validate(range(min = 0.0, max = 0.9))]
    pub chunk_overlap_ratio: f32,
    /// Confidence threshold below which the filename-heuristic destination
    /// override fires.
    #[validate(range(min = 0.0, max = 1.0))]
    pub destination_override_confidence: f32,
    /// Final number of results returned by the retriever.
    #[validate(range(min = 1))]
    pub retrieval_top_k: usize,
    /// Over-fetch multiplier applied to `retrieval_top_k` before post-scoring.
    #[validate(range(min = 1.0, max = 10.0))]
    pub retrieval_overfetch_factor: f32,
    /// Minimum hard-filtered result count before falling back to no hard
    /// filter.
    #[validate(range(min = 1))]
    pub retrieval_fallback_threshold: usize,
    /// Session idle expiry in seconds (default 24h).
    #[validate(range(min = 1))]
    pub session_ttl_secs: u64,
    /// Number of verbatim recent turns kept in the session ring (default 3).
    #[validate(range(min = 1))]
    pub session_ring_size: usize,
    /// Maximum number of terms in an expanded query.
    #[validate(range(min = 1))]
    pub expansion_term_limit: usize,
    /// Capacity of the process-wide embedding cache.
    #[validate(range(min = 1))]
    pub embedding_cache_capacity: usize,
    /// Capacity of the process-wide query-expansion cache.
    #[validate(range(min = 1))]
    pub expansion_cache_capacity: usize,

    #[validate(nested)]
    pub penalty_weights: PenaltyWeights,
    #[validate(nested)]
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 1024,
            chunk_overlap_ratio: 0.2,
            destination_override_confidence: 0.6,
            retrieval_top_k: 8,
            retrieval_overfetch_factor: 4.0,
            retrieval_fallback_threshold: 3,
            session_ttl_secs: 24 * 60 * 60,
            session_ring_size: 3,
            expansion_term_limit: 12,
            embedding_cache_capacity: 50_000,
            expansion_cache_capacity: 20_000,
            penalty_weights: PenaltyWeights::default(),
            timeouts: StageTimeouts::default(),
        }
    }
}

/// Builder for [`PipelineConfig`], layering file and environment overrides
/// on top of compiled defaults.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    base: PipelineConfig,
    use_env: bool,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: PipelineConfig::default(),
            use_env: false,
        }
    }

    /// Load a TOML config file, overlaying any fields it sets onto the
    /// compiled defaults.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, RagError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(|err| RagError::Config(err.to_string()))?;
        self.base = settings
            .try_deserialize()
            .map_err(|err| RagError::Config(err.to_string()))?;
        Ok(self)
    }

    /// Enable `VODIC_*`-prefixed environment variable overrides, e.g.
    /// `VODIC_RETRIEVAL_TOP_K=10`.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    pub fn build(mut self) -> Result<PipelineConfig, RagError> {
        if self.use_env {
            dotenvy::dotenv().ok();
            let settings = config::Config::builder()
                .add_source(
                    config::Config::try_from(&self.base)
                        .map_err(|err| RagError::Config(err.to_string()))?,
                )
                .add_source(config::Environment::with_prefix("VODIC").separator("_"))
                .build()
                .map_err(|err| RagError::Config(err.to_string()))?;
            self.base = settings
                .try_deserialize()
                .map_err(|err| RagError::Config(err.to_string()))?;
        }

        self.base
            .validate()
            .map_err(|err| RagError::Config(err.to_string()))?;
        Ok(self.base)
    }
}
