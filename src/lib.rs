//! Scorewall - a score-based inline request inspection engine.
//!
//! Scorewall evaluates each HTTP request against a set of pattern rules. Every
//! match contributes weighted scores to named tags (`$SQL`, `$XSS`, ...), and
//! per-location threshold rules decide whether the request is blocked or
//! allowed. The engine is host-agnostic; an axum middleware and a small
//! reference server are included.
//!
//! # Features
//! - `MainRule` / `BasicRule` pattern rules over URL, arguments, headers and body
//! - Named-variable targeting and per-rule whitelists
//! - `CheckRule` score thresholds with BLOCK / ALLOW / LOG actions
//! - Per-location enable, learning mode and denied URL
//! - Streaming body delivery through an explicit evaluation state machine
//! - Structured tracing and `metrics` counters
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use scorewall::{HttpHandler, WafEngine, config::load_config};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = load_config("scorewall.yaml").await?;
//! let engine = Arc::new(WafEngine::from_config(&cfg)?);
//! let app = HttpHandler::new(engine, None).router();
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the inspection logic inside `core`. The engine itself never performs I/O: hosts feed it
//! request data and body chunks through [`core::waf::Event`]s and enact the
//! [`core::waf::Disposition`] it returns.
//!
//! # Error Handling
//! Directive and scope problems are reported as typed errors
//! ([`core::waf::ConfigError`], [`core::waf::ScopeError`]); application plumbing returns
//! `eyre::Result<T>` with `WrapErr` context.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, Upstream},
    core::WafEngine,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
