//! # PDR Analysis
//!
//! Predictive document analysis: find documents that a text references but
//! does not include.
//!
//! A document arrives as ordered, page-tagged chunks. The engine packs them
//! into batches under per-call limits, keeps the number of inference calls
//! within a budget, fans the batches out to a structured-output AI service
//! with bounded concurrency and an overall deadline, and merges the answers
//! back in document order.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌────────────┐
//! │  Chunks  │──▶│ Plan + Batch │──▶│  Scheduler  │──▶│   Merge +  │
//! │ (pages)  │   │    (core)    │   │ (N permits) │   │   Stats    │
//! └──────────┘   └──────────────┘   └──────┬──────┘   └─────┬──────┘
//!                                          ▼                ▼
//!                                   ┌─────────────┐   ┌────────────┐
//!                                   │ Inference   │   │  Service:  │
//!                                   │ client      │   │ cache,     │
//!                                   │ (OpenAI)    │   │ metrics    │
//!                                   └─────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdr config-check                               # validate ./config/pdr.toml
//! pdr plan --chunks doc.json                     # dry run: show batching
//! pdr analyze --chunks doc.json --document-id 42 --type contract
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`engine`] | Orchestration of one analysis run |
//! | [`scheduler`] | Bounded-concurrency batch dispatch |
//! | [`openai`] | Inference client implementations |
//! | [`service`] | Request handling: cache, report, metrics |
//! | [`cache`] | TTL + LRU cache of reports, persisted by the CLI |
//! | [`report`] | Report returned to callers |
//! | [`metrics`] | Prometheus request counters and histograms |
//! | [`related`] | Related-document web search |
//! | [`progress`] | Batch settlement progress on stderr |
//! | [`commands`] | `pdr` subcommands |
//!
//! Pure batching, planning, and aggregation live in `pdr-analysis-core`.

pub mod cache;
pub mod commands;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod openai;
pub mod progress;
pub mod related;
pub mod report;
pub mod scheduler;
pub mod service;
