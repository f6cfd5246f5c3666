//! Kivu Core - Shared types library.
//!
//! This crate provides common types used across all Kivu components:
//! - `orders` - Order fulfillment engine and retry worker
//! - `cli` - Command-line tools for migrations and operator tasks
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no registrar clients. This keeps it lightweight and
//! allows it to be used anywhere, including the integration-test harness.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, domain names, prices,
//!   contact snapshots, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
