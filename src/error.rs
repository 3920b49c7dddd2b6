//! Error types for the QFOS engine.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes for the CLI driver
//! - A fatal/non-fatal split: `ConfigError` and `InputOrderError` abort a
//!   run; every other variant is recorded as a warning on the report.
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for QFOS operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// An out-of-order timestamp within a provider partition (fatal).
    InputOrder,
    /// A provider partition has fewer than 10 requests after filtering.
    EmptyPartition,
    /// A candidate window yielded fewer than 10 sessions.
    LowSupport,
    /// The TF-IDF vocabulary for an evaluation is empty.
    EmbeddingDegenerate,
    /// Invalid configuration (fatal).
    Config,
    /// A cooperative cancellation signal was observed mid-evaluation (fatal).
    Cancelled,
    Io,
    Json,
    Internal,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::InputOrder => "INPUT_ORDER_ERROR",
            Self::EmptyPartition => "EMPTY_PARTITION_WARNING",
            Self::LowSupport => "LOW_SUPPORT_WARNING",
            Self::EmbeddingDegenerate => "EMBEDDING_DEGENERATE",
            Self::Config => "CONFIG_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Io => "IO_ERROR",
            Self::Json => "JSON_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Internal => 1,
            Self::Config => 2,
            Self::InputOrder => 3,
            Self::EmptyPartition | Self::LowSupport | Self::EmbeddingDegenerate => 4,
            Self::Io => 5,
            Self::Json => 6,
            Self::Cancelled => 130,
        }
    }

    /// Whether this error is fatal to the whole run rather than a
    /// per-evaluation warning recorded on the report (spec.md §7).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config | Self::InputOrder | Self::Cancelled)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in QFOS engine operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("out-of-order timestamp in provider '{provider}' at row {row}")]
    InputOrder { provider: String, row: usize },

    #[error("provider '{provider}' has only {count} requests after filtering (< 10)")]
    EmptyPartition { provider: String, count: usize },

    #[error("window {window_ms}ms yielded only {session_count} sessions (< 10)")]
    LowSupport { window_ms: u64, session_count: usize },

    #[error("TF-IDF vocabulary is empty for this evaluation: {reason}")]
    EmbeddingDegenerate { reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::InputOrder { .. } => ErrorCode::InputOrder,
            Self::EmptyPartition { .. } => ErrorCode::EmptyPartition,
            Self::LowSupport { .. } => ErrorCode::LowSupport,
            Self::EmbeddingDegenerate { .. } => ErrorCode::EmbeddingDegenerate,
            Self::Config(_) => ErrorCode::Config,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Io(_) => ErrorCode::Io,
            Self::Json(_) => ErrorCode::Json,
            Self::Other(_) => ErrorCode::Internal,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether this error should abort the whole run (spec.md §7) rather
    /// than be recorded as a warning on the evaluation it occurred in.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.error_code().is_fatal()
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "fatal": code.is_fatal(),
                "exit_code": code.exit_code(),
            }
        })
    }
}
