//! Postgres-backed [`InventoryLedger`].
//!
//! Stock lives in `products.stock`. A reservation is a conditional decrement
//! of that column plus a `stock_reservations` row, written in one
//! transaction. Every state change on a reservation is a compare-and-set on
//! its `state` column, so concurrent commit/release/expiry calls cannot apply
//! twice.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
    ActiveValue::NotSet,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    entity::{
        products::{Column as ProdCol, Entity as Products},
        stock_reservations::{
            ActiveModel as ReservationActive, Column as ReservationCol, Entity as StockReservations,
        },
    },
    error::{AppError, AppResult},
    repository::{to_i32, to_u32},
    services::inventory::{InventoryLedger, ReservationToken},
};

const HELD: &str = "held";
const COMMITTED: &str = "committed";
const RELEASED: &str = "released";
const SWEEP_BATCH: u64 = 500;

#[derive(Debug, Clone)]
pub struct PgInventory {
    db: DatabaseConnection,
    ttl: chrono::Duration,
}

impl PgInventory {
    pub fn new(db: DatabaseConnection, ttl: Duration) -> Self {
        Self {
            db,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Flips a held reservation to released and returns its stock.
    /// `false` when the reservation was no longer held.
    async fn release_held(&self, id: Uuid, product_id: Uuid, quantity: u32) -> AppResult<bool> {
        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        let flipped = StockReservations::update_many()
            .col_expr(ReservationCol::State, Expr::value(RELEASED))
            .col_expr(ReservationCol::UpdatedAt, Expr::value(now))
            .filter(ReservationCol::Id.eq(id))
            .filter(ReservationCol::State.eq(HELD))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            return Ok(false);
        }

        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(to_i32(quantity)?))
            .filter(ProdCol::Id.eq(product_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl InventoryLedger for PgInventory {
    async fn available(&self, product_id: Uuid) -> AppResult<u32> {
        match Products::find_by_id(product_id).one(&self.db).await? {
            Some(product) => to_u32(product.stock),
            None => Ok(0),
        }
    }

    async fn reserve(&self, product_id: Uuid, quantity: u32) -> AppResult<ReservationToken> {
        if quantity == 0 {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
        let qty = to_i32(quantity)?;
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let decremented = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(qty))
            .filter(ProdCol::Id.eq(product_id))
            .filter(ProdCol::Stock.gte(qty))
            .exec(&txn)
            .await?;
        if decremented.rows_affected == 0 {
            return Err(AppError::InsufficientStock { product_id });
        }

        let id = Uuid::new_v4();
        ReservationActive {
            id: Set(id),
            product_id: Set(product_id),
            quantity: Set(qty),
            state: Set(HELD.into()),
            expires_at: Set((now + self.ttl).fixed_offset()),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        tracing::debug!(reservation_id = %id, %product_id, quantity, "stock reserved");
        Ok(ReservationToken {
            id,
            product_id,
            quantity,
        })
    }

    async fn commit(&self, token: &ReservationToken) -> AppResult<()> {
        let now = Utc::now().fixed_offset();
        let committed = StockReservations::update_many()
            .col_expr(ReservationCol::State, Expr::value(COMMITTED))
            .col_expr(ReservationCol::UpdatedAt, Expr::value(now))
            .filter(ReservationCol::Id.eq(token.id))
            .filter(ReservationCol::State.eq(HELD))
            .filter(ReservationCol::ExpiresAt.gt(now))
            .exec(&self.db)
            .await?;
        if committed.rows_affected == 1 {
            return Ok(());
        }

        let current = StockReservations::find_by_id(token.id)
            .one(&self.db)
            .await?
            .ok_or(AppError::InvalidTokenState(token.id))?;

        match current.state.as_str() {
            COMMITTED => Ok(()),
            HELD => {
                // Held but past its expiry.
                self.release_held(token.id, current.product_id, to_u32(current.quantity)?)
                    .await?;
                tracing::warn!(reservation_id = %token.id, "reservation expired before commit");
                Err(AppError::InvalidTokenState(token.id))
            }
            _ => Err(AppError::InvalidTokenState(token.id)),
        }
    }

    async fn release(&self, token: &ReservationToken) -> AppResult<()> {
        if self
            .release_held(token.id, token.product_id, token.quantity)
            .await?
        {
            tracing::debug!(reservation_id = %token.id, "reservation released");
            Ok(())
        } else {
            Err(AppError::InvalidTokenState(token.id))
        }
    }

    async fn restock(&self, product_id: Uuid, quantity: u32) -> AppResult<()> {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(to_i32(quantity)?))
            .filter(ProdCol::Id.eq(product_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn release_expired(&self) -> AppResult<usize> {
        let now = Utc::now().fixed_offset();
        let expired = StockReservations::find()
            .filter(ReservationCol::State.eq(HELD))
            .filter(ReservationCol::ExpiresAt.lte(now))
            .limit(SWEEP_BATCH)
            .all(&self.db)
            .await?;

        let mut released = 0;
        for reservation in expired {
            if self
                .release_held(reservation.id, reservation.product_id, to_u32(reservation.quantity)?)
                .await?
            {
                released += 1;
            }
        }
        if released > 0 {
            tracing::info!(count = released, "expired reservations released");
        }
        Ok(released)
    }
}
