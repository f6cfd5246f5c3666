//! Core types for Kivu Domains.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod contact;
pub mod domain;
pub mod id;
pub mod price;
pub mod status;

pub use contact::ContactSnapshot;
pub use domain::{DomainName, DomainNameError, Registrar};
pub use id::*;
pub use price::Price;
pub use status::*;
