//! Unified error handling for the fulfillment engine.

use thiserror::Error;

use crate::config::ConfigError;
use crate::jobs::QueueError;
use crate::registrar::RegistrarError;
use crate::services::notifications::NotifyError;
use crate::store::StoreError;

/// Application-level error type.
///
/// Ordinary registrar rejections never appear here - they are values
/// (`RegistrarResponse { success: false, .. }`) absorbed at the item
/// boundary. An `AppError` escaping the orchestrator's per-item loop is by
/// definition an unexpected fault and lands the order in
/// `requires_attention`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Order store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Registrar transport fault escaped the item boundary.
    #[error("registrar error: {0}")]
    Registrar(#[from] RegistrarError),

    /// Notification delivery failed.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Work item could not be scheduled.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Caller handed the engine something unusable.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("order 9 has no items".to_owned());
        assert_eq!(err.to_string(), "bad request: order 9 has no items");
    }

    #[test]
    fn test_store_error_conversion() {
        let err: AppError = StoreError::InvalidState("not processing".to_owned()).into();
        assert!(matches!(err, AppError::Store(_)));
    }
}
