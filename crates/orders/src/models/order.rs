//! Order and order item models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kivu_core::{OrderId, OrderItemId, OrderStatus, OrderType, UserId};

/// One customer purchase transaction.
///
/// Created at checkout completion (payment already confirmed); mutated only
/// by the orchestrator and operator retry actions; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Human-readable order number (ORD-prefixed).
    pub order_number: String,
    /// Customer who placed the order.
    pub user_id: UserId,
    /// Customer email, denormalized at checkout for notifications.
    pub customer_email: String,
    /// What the order purchases.
    pub order_type: OrderType,
    /// Current processing status.
    pub status: OrderStatus,
    /// ISO 4217 currency code.
    pub currency_code: String,
    /// Total amount charged.
    pub total_amount: Decimal,
    /// Append-only free-text operational notes.
    pub notes: Option<String>,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

/// One purchasable unit within an order.
///
/// Immutable once created except for `domain_id` (set when the registrar
/// confirms the registration) and metadata enrichment.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    /// Unique item ID.
    pub id: OrderItemId,
    /// Order this item belongs to.
    pub order_id: OrderId,
    /// Domain name being purchased (raw; validated at registration time).
    pub domain_name: String,
    /// Registration/renewal term in years.
    pub years: i32,
    /// Price for this line.
    pub price: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: String,
    /// Provider domain handle, set once registered.
    pub domain_id: Option<String>,
    /// Arbitrary metadata (billing cycle, linked domain, contact overrides).
    pub metadata: serde_json::Value,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Whether the registrar has confirmed this item.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        self.domain_id.is_some()
    }
}

/// An order with all of its line items loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    /// The order itself.
    pub order: Order,
    /// Line items, in creation order.
    pub items: Vec<OrderItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn item(domain_id: Option<String>) -> OrderItem {
        OrderItem {
            id: OrderItemId::new(1),
            order_id: OrderId::new(1),
            domain_name: "example.rw".to_owned(),
            years: 1,
            price: Decimal::new(15_000, 0),
            currency_code: "RWF".to_owned(),
            domain_id,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_item_registered_flag() {
        assert!(!item(None).is_registered());
        assert!(item(Some("D-123".to_owned())).is_registered());
    }
}
