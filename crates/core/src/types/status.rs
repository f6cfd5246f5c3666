//! Status enums for orders and failed registrations.
//!
//! Both state machines are deliberately small and one-directional. All
//! writes to these statuses go through the lifecycle methods in the orders
//! crate, never ad hoc field updates.

use serde::{Deserialize, Serialize};

/// What an order purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// New domain registration(s).
    Registration,
    /// Renewal of existing domain(s).
    Renewal,
    /// Inbound domain transfer.
    Transfer,
    /// Hosting plan only, no registrar work.
    Hosting,
    /// Automatic hosting subscription renewal.
    SubscriptionRenewal,
}

/// Order processing status.
///
/// Transitions are monotonic (`Pending` → `Processing` → a terminal state)
/// with one escape hatch: `RequiresAttention` is reachable from any
/// in-flight state when an unrecoverable fault occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Payment confirmed, registrations not yet attempted.
    Pending,
    /// Registrations in progress.
    Processing,
    /// Every line item fulfilled.
    Completed,
    /// Some line items fulfilled, the rest tracked as failed registrations.
    PartiallyCompleted,
    /// Every line item failed at the registrar.
    Failed,
    /// Unexpected fault - a human has to look at this order.
    RequiresAttention,
}

impl OrderStatus {
    /// Whether the orchestrator may still act on an order in this status.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Whether `next` is a legal transition from this status.
    ///
    /// `RequiresAttention` is reachable from any in-flight state; a
    /// partially completed order may still finish once its outstanding
    /// failures resolve.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Processing | Self::RequiresAttention),
            Self::Processing => matches!(
                next,
                Self::Completed
                    | Self::PartiallyCompleted
                    | Self::Failed
                    | Self::RequiresAttention
            ),
            Self::PartiallyCompleted | Self::Failed => matches!(next, Self::Completed),
            Self::Completed | Self::RequiresAttention => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::PartiallyCompleted => write!(f, "partially_completed"),
            Self::Failed => write!(f, "failed"),
            Self::RequiresAttention => write!(f, "requires_attention"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "partially_completed" => Ok(Self::PartiallyCompleted),
            "failed" => Ok(Self::Failed),
            "requires_attention" => Ok(Self::RequiresAttention),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration => write!(f, "registration"),
            Self::Renewal => write!(f, "renewal"),
            Self::Transfer => write!(f, "transfer"),
            Self::Hosting => write!(f, "hosting"),
            Self::SubscriptionRenewal => write!(f, "subscription_renewal"),
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "renewal" => Ok(Self::Renewal),
            "transfer" => Ok(Self::Transfer),
            "hosting" => Ok(Self::Hosting),
            "subscription_renewal" => Ok(Self::SubscriptionRenewal),
            _ => Err(format!("invalid order type: {s}")),
        }
    }
}

/// Lifecycle status of one failed registration record.
///
/// `Pending → Retrying → {Resolved | Abandoned}`, one-directional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "failure_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    /// Recorded, first retry not yet attempted.
    Pending,
    /// At least one retry attempted, budget not exhausted.
    Retrying,
    /// A retry eventually registered the domain.
    Resolved,
    /// Retry budget exhausted - needs manual registration or refund.
    Abandoned,
}

impl FailureStatus {
    /// Terminal records are never touched again by the retry machinery.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Abandoned)
    }
}

impl std::fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Retrying => write!(f, "retrying"),
            Self::Resolved => write!(f, "resolved"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl std::str::FromStr for FailureStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "retrying" => Ok(Self::Retrying),
            "resolved" => Ok(Self::Resolved),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("invalid failure status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_monotonic() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::PartiallyCompleted));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Failed));

        // No going backwards
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_requires_attention_escape_hatch() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::RequiresAttention));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::RequiresAttention));
        // But it is terminal itself
        assert!(!OrderStatus::RequiresAttention.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_late_completion_after_retries() {
        // A partially completed or failed order finishes once its last
        // outstanding failure resolves.
        assert!(OrderStatus::PartiallyCompleted.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Failed.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_failure_status_terminal() {
        assert!(!FailureStatus::Pending.is_terminal());
        assert!(!FailureStatus::Retrying.is_terminal());
        assert!(FailureStatus::Resolved.is_terminal());
        assert!(FailureStatus::Abandoned.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::PartiallyCompleted,
            OrderStatus::Failed,
            OrderStatus::RequiresAttention,
        ] {
            let parsed: OrderStatus = status.to_string().parse().expect("round trip");
            assert_eq!(parsed, status);
        }
    }
}
