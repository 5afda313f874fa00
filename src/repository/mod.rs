//! Storage seams used by the checkout core.
//!
//! Each trait has an in-memory backend (guest sessions, tests, local
//! development) and a Postgres backend built on sea-orm.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        CartLine, CartOwner, Commission, Order, OrderLine, OrderStatus, OrderWithLines,
        PaymentStatus, Product, PromoCode, Seller,
    },
};

pub mod memory;
pub mod postgres;

/// Read access to products, sellers and promo codes owned by the surrounding catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: Uuid) -> AppResult<Option<Product>>;

    async fn products(&self, ids: &[Uuid]) -> AppResult<Vec<Product>>;

    async fn seller(&self, id: Uuid) -> AppResult<Option<Seller>>;

    /// Looks up a normalized code.
    async fn promo_code(&self, code: &str) -> AppResult<Option<PromoCode>>;

    /// Counts one use of the code unless that would pass `max_uses`.
    /// Returns `false` when nothing was counted.
    async fn redeem_promo_code(&self, code: &str) -> AppResult<bool>;

    /// Undoes one [`Catalog::redeem_promo_code`].
    async fn release_promo_code(&self, code: &str) -> AppResult<()>;
}

#[async_trait]
pub trait CartBackend: Send + Sync {
    async fn lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>>;

    /// Inserts or overwrites the line for `product_id`.
    async fn put(&self, owner: &CartOwner, product_id: Uuid, quantity: u32) -> AppResult<CartLine>;

    /// Returns `false` when there was no such line.
    async fn remove(&self, owner: &CartOwner, product_id: Uuid) -> AppResult<bool>;

    async fn clear(&self, owner: &CartOwner) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order and all of its lines, or nothing.
    async fn insert(&self, order: &Order, lines: &[OrderLine]) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<OrderWithLines>>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<Order>, u64)>;

    /// Moves the order from `from` to `to`. `None` when it was not in `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Order>>;

    /// Sets the payment status if it is currently one of `from`.
    async fn set_payment_status(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Order>>;

    /// Inserts unless a commission for the same (seller, order) exists.
    /// Returns whether a row was written.
    async fn insert_commission(&self, commission: &Commission) -> AppResult<bool>;

    async fn commissions(&self, order_id: Uuid) -> AppResult<Vec<Commission>>;
}

pub(crate) fn to_u32(value: i32) -> AppResult<u32> {
    u32::try_from(value).map_err(|err| AppError::Internal(err.into()))
}

pub(crate) fn to_i32(value: u32) -> AppResult<i32> {
    i32::try_from(value).map_err(|err| AppError::Internal(err.into()))
}
