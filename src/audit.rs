//! Append-only audit trail for order lifecycle events.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult, models::Order};

pub const ORDER_RESOURCE: &str = "orders";

/// One `audit_logs` row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor: Option<Uuid>,
    pub action: String,
    pub resource: &'static str,
    pub resource_id: Uuid,
    pub metadata: Value,
}

impl AuditEntry {
    /// Snapshot of the order fields worth keeping next to `action`.
    pub fn for_order(action: &str, order: &Order) -> Self {
        Self {
            actor: Some(order.user_id),
            action: action.to_string(),
            resource: ORDER_RESOURCE,
            resource_id: order.id,
            metadata: json!({
                "invoice_number": order.invoice_number,
                "status": order.status,
                "payment_status": order.payment_status,
                "grand_total": order.grand_total,
            }),
        }
    }
}

pub async fn append(pool: &DbPool, entry: &AuditEntry) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, resource_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.actor)
    .bind(&entry.action)
    .bind(entry.resource)
    .bind(entry.resource_id)
    .bind(&entry.metadata)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{OrderStatus, PaymentStatus};

    #[test]
    fn order_entry_carries_status_and_total() {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            invoice_number: "INV-20260101-abcdef01".into(),
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            subtotal: dec!(90),
            shipping_cost: dec!(10),
            discount_amount: dec!(0),
            grand_total: dec!(100),
            promo_code: None,
            shipping_address: "1 Main St".into(),
            paid_at: Some(now),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        let entry = AuditEntry::for_order("order_confirmed", &order);
        assert_eq!(entry.actor, Some(order.user_id));
        assert_eq!(entry.resource_id, order.id);
        assert_eq!(entry.metadata["status"], "confirmed");
        assert_eq!(entry.metadata["payment_status"], "paid");
        assert_eq!(entry.metadata["grand_total"], "100");
    }
}
