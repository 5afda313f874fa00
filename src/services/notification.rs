//! Order event notifications.
//!
//! Dispatch is fire-and-forget: [`dispatch`] spawns the call and only logs a
//! failure. Nothing in checkout waits on it.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    audit::{AuditEntry, append},
    db::DbPool,
    models::Order,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    OrderCreated,
    OrderConfirmed,
    OrderShipped,
    OrderCancelled,
}

impl OrderEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated => "order_created",
            OrderEvent::OrderConfirmed => "order_confirmed",
            OrderEvent::OrderShipped => "order_shipped",
            OrderEvent::OrderCancelled => "order_cancelled",
        }
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event: OrderEvent, order: &Order) -> anyhow::Result<()>;
}

/// Hands the event to `dispatcher` on a separate task.
pub fn dispatch(dispatcher: Arc<dyn NotificationDispatcher>, event: OrderEvent, order: Order) {
    tokio::spawn(async move {
        if let Err(err) = dispatcher.notify(event, &order).await {
            tracing::warn!(%event, order_id = %order.id, error = %err, "notification failed");
        }
    });
}

#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationDispatcher for TracingNotifier {
    async fn notify(&self, event: OrderEvent, order: &Order) -> anyhow::Result<()> {
        tracing::info!(
            %event,
            order_id = %order.id,
            user_id = %order.user_id,
            status = %order.status,
            grand_total = %order.grand_total,
            "order event"
        );
        Ok(())
    }
}

/// Records each event as an `audit_logs` row.
#[derive(Debug, Clone)]
pub struct AuditLogNotifier {
    pool: DbPool,
}

impl AuditLogNotifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationDispatcher for AuditLogNotifier {
    async fn notify(&self, event: OrderEvent, order: &Order) -> anyhow::Result<()> {
        append(&self.pool, &AuditEntry::for_order(event.as_str(), order)).await?;
        Ok(())
    }
}

/// Sends every event to each inner dispatcher; the first failure is reported
/// after all of them have been tried.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn NotificationDispatcher>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn NotificationDispatcher>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl NotificationDispatcher for FanoutNotifier {
    async fn notify(&self, event: OrderEvent, order: &Order) -> anyhow::Result<()> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(err) = target.notify(event, order).await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
