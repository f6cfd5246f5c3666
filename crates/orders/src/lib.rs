//! Kivu Orders - domain registration fulfillment engine.
//!
//! This crate owns the path between "payment confirmed" and "domains
//! registered": the registration orchestrator, the failed-registration
//! retry machinery, the two registrar backends, and the notifications the
//! surrounding platform delivers.
//!
//! # Architecture
//!
//! - [`services::orchestrator`] - drives every line item of a paid order
//!   through the registrar and classifies the aggregate outcome
//! - [`services::retry`] - periodic sweep plus single-record retry with a
//!   compare-and-set claim per attempt
//! - [`registrar`] - one trait, two backends (EPP local registry, reseller
//!   HTTP API), routed by a pure TLD rule
//! - [`store`] - the persistence capability; Postgres in production
//! - [`jobs`] - work items scheduled onto the host application's queue
//!
//! The binary in `main.rs` is the retry worker: it sweeps due failure
//! records on an interval. Order processing is invoked through
//! [`jobs::handle_work_item`] by the host queue runner (or the CLI).

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod registrar;
pub mod services;
pub mod store;

pub use error::AppError;
