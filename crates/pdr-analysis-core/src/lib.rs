//! # PDR Analysis Core
//!
//! Runtime-free logic for predictive document analysis: data models, the
//! chunk batcher, call budget planning, result merging, run statistics,
//! cache keys, and the inference client trait.
//!
//! This crate contains no tokio, network, or filesystem code. The
//! concurrency scheduler and the concrete inference clients live in the
//! `pdr-analysis` app crate.

pub mod aggregate;
pub mod batch;
pub mod cache_key;
pub mod error;
pub mod inference;
pub mod models;
pub mod outcome;
pub mod plan;
pub mod stats;
