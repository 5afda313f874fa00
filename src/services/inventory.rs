//! Stock reservations.
//!
//! A reservation takes stock out of the available count immediately. It is
//! then either committed (the stock is sold) or released (the stock returns).
//! Reservations left untouched past their TTL are released by
//! [`InventoryLedger::release_expired`]. Settled reservations stay on record
//! for one more TTL so a retried commit or release gets a stable answer, then
//! the same sweep forgets them.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReservationToken {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
}

#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Stock that can still be reserved.
    async fn available(&self, product_id: Uuid) -> AppResult<u32>;

    /// Atomically takes `quantity` out of available stock, or nothing at all.
    async fn reserve(&self, product_id: Uuid, quantity: u32) -> AppResult<ReservationToken>;

    /// Idempotent: committing a committed token is a no-op.
    async fn commit(&self, token: &ReservationToken) -> AppResult<()>;

    /// Returns the held quantity; fails for committed or released tokens.
    async fn release(&self, token: &ReservationToken) -> AppResult<()>;

    /// Puts sold stock back, e.g. for a cancelled order.
    async fn restock(&self, product_id: Uuid, quantity: u32) -> AppResult<()>;

    /// Releases every held reservation whose TTL has passed and forgets
    /// settled ones older than the TTL. Returns how many were released.
    async fn release_expired(&self) -> AppResult<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReservationState {
    Held { expires_at: Instant },
    Committed { settled_at: Instant },
    Released { settled_at: Instant },
}

impl ReservationState {
    fn settled_before(&self, cutoff: Instant) -> bool {
        match *self {
            Self::Held { .. } => false,
            Self::Committed { settled_at } | Self::Released { settled_at } => settled_at <= cutoff,
        }
    }
}

#[derive(Debug)]
struct Reservation {
    product_id: Uuid,
    quantity: u32,
    state: ReservationState,
}

/// In-process ledger. Each product's count sits behind its own mutex, so a
/// reservation is a single check-and-decrement under that lock.
#[derive(Debug)]
pub struct MemoryInventory {
    ttl: Duration,
    stock: RwLock<HashMap<Uuid, Arc<Mutex<u32>>>>,
    reservations: Mutex<HashMap<Uuid, Reservation>>,
}

impl MemoryInventory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            stock: RwLock::new(HashMap::new()),
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the available count for a product, e.g. after a seller edit.
    pub async fn set_stock(&self, product_id: Uuid, quantity: u32) {
        let slot = {
            let mut stock = self.stock.write().await;
            stock
                .entry(product_id)
                .or_insert_with(|| Arc::new(Mutex::new(0)))
                .clone()
        };
        *slot.lock().await = quantity;
    }

    async fn slot(&self, product_id: Uuid) -> Option<Arc<Mutex<u32>>> {
        self.stock.read().await.get(&product_id).cloned()
    }

    async fn give_back(&self, product_id: Uuid, quantity: u32) -> AppResult<()> {
        let slot = self.slot(product_id).await.ok_or(AppError::NotFound)?;
        let mut available = slot.lock().await;
        *available = available.saturating_add(quantity);
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for MemoryInventory {
    async fn available(&self, product_id: Uuid) -> AppResult<u32> {
        match self.slot(product_id).await {
            Some(slot) => Ok(*slot.lock().await),
            None => Ok(0),
        }
    }

    async fn reserve(&self, product_id: Uuid, quantity: u32) -> AppResult<ReservationToken> {
        if quantity == 0 {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
        let slot = self
            .slot(product_id)
            .await
            .ok_or(AppError::InsufficientStock { product_id })?;

        {
            let mut available = slot.lock().await;
            if *available < quantity {
                return Err(AppError::InsufficientStock { product_id });
            }
            *available -= quantity;
        }

        let token = ReservationToken {
            id: Uuid::new_v4(),
            product_id,
            quantity,
        };
        self.reservations.lock().await.insert(
            token.id,
            Reservation {
                product_id,
                quantity,
                state: ReservationState::Held {
                    expires_at: Instant::now() + self.ttl,
                },
            },
        );

        tracing::debug!(reservation_id = %token.id, %product_id, quantity, "stock reserved");
        Ok(token)
    }

    async fn commit(&self, token: &ReservationToken) -> AppResult<()> {
        let expired = {
            let mut reservations = self.reservations.lock().await;
            let reservation = reservations
                .get_mut(&token.id)
                .ok_or(AppError::InvalidTokenState(token.id))?;
            let now = Instant::now();
            match reservation.state {
                ReservationState::Committed { .. } => return Ok(()),
                ReservationState::Released { .. } => return Err(AppError::InvalidTokenState(token.id)),
                ReservationState::Held { expires_at } if expires_at <= now => {
                    reservation.state = ReservationState::Released { settled_at: now };
                    true
                }
                ReservationState::Held { .. } => {
                    reservation.state = ReservationState::Committed { settled_at: now };
                    false
                }
            }
        };

        if expired {
            self.give_back(token.product_id, token.quantity).await?;
            tracing::warn!(reservation_id = %token.id, "reservation expired before commit");
            return Err(AppError::InvalidTokenState(token.id));
        }
        Ok(())
    }

    async fn release(&self, token: &ReservationToken) -> AppResult<()> {
        {
            let mut reservations = self.reservations.lock().await;
            let reservation = reservations
                .get_mut(&token.id)
                .ok_or(AppError::InvalidTokenState(token.id))?;
            match reservation.state {
                ReservationState::Held { .. } => {
                    reservation.state = ReservationState::Released {
                        settled_at: Instant::now(),
                    };
                }
                ReservationState::Committed { .. } | ReservationState::Released { .. } => {
                    return Err(AppError::InvalidTokenState(token.id));
                }
            }
        }

        self.give_back(token.product_id, token.quantity).await?;
        tracing::debug!(reservation_id = %token.id, "reservation released");
        Ok(())
    }

    async fn restock(&self, product_id: Uuid, quantity: u32) -> AppResult<()> {
        let slot = {
            let mut stock = self.stock.write().await;
            stock
                .entry(product_id)
                .or_insert_with(|| Arc::new(Mutex::new(0)))
                .clone()
        };
        let mut available = slot.lock().await;
        *available = available.saturating_add(quantity);
        Ok(())
    }

    async fn release_expired(&self) -> AppResult<usize> {
        let now = Instant::now();
        let expired: Vec<(Uuid, u32)> = {
            let mut reservations = self.reservations.lock().await;
            if let Some(cutoff) = now.checked_sub(self.ttl) {
                reservations.retain(|_, reservation| !reservation.state.settled_before(cutoff));
            }
            reservations
                .values_mut()
                .filter_map(|reservation| match reservation.state {
                    ReservationState::Held { expires_at } if expires_at <= now => {
                        reservation.state = ReservationState::Released { settled_at: now };
                        Some((reservation.product_id, reservation.quantity))
                    }
                    _ => None,
                })
                .collect()
        };

        for (product_id, quantity) in &expired {
            self.give_back(*product_id, *quantity).await?;
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired reservations released");
        }
        Ok(expired.len())
    }
}
