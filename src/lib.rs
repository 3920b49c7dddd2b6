//! QFOS — Query Fan-Out Session detection and window-optimization engine.
//!
//! Groups bot-originated HTTP requests into sessions that approximate a
//! single upstream user query, refines those sessions with semantic
//! analysis of request URLs, and searches for the time-gap threshold that
//! maximizes a composite quality score (`OptScore`) over a labeled-by-
//! provider dataset.
//!
//! # Architecture
//!
//! - [`model`] — `Request`, `Provider`, `Session`, `OptScoreReport`
//! - [`tokenizer`] — deterministic URL tokenization
//! - [`embedding`] — TF-IDF (default) and pluggable dense embedding backends
//! - [`bundler`] — streaming gap-based temporal grouping
//! - [`metrics`] — MIBCS, BPS, singleton/giant rate, thematic variance, silhouette
//! - [`refiner`] — collision detection and graph-based semantic splitting
//! - [`optimizer`] — window sweep, cross-validation, confidence-rated recommendation
//! - [`source`] / [`sink`] — abstract request/session collaborators plus
//!   reference NDJSON adapters
//! - [`config`] — typed configuration, loading, validation
//! - [`error`] — error types and handling
//! - [`cli`] — command-line interface (binary-only concern, still part of the library for testability)

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bundler;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod refiner;
pub mod sink;
pub mod source;
pub mod tokenizer;

pub use error::{Error, Result};
