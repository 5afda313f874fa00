use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{sync::RwLock, time::Instant};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        CartLine, CartOwner, Commission, Order, OrderLine, OrderStatus, OrderWithLines,
        PaymentStatus, Product, PromoCode, Seller,
    },
    repository::{CartBackend, Catalog, OrderStore},
    services::inventory::{InventoryLedger, MemoryInventory},
};

/// Products, sellers and promo codes held in process memory.
///
/// A catalog built with [`MemoryCatalog::stocked`] keeps `Product::stock` in
/// step with its ledger: upserts set the ledger count and reads report what
/// the ledger has available. A plain [`MemoryCatalog::new`] leaves stock to
/// the caller.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<Uuid, Product>>,
    sellers: RwLock<HashMap<Uuid, Seller>>,
    promo_codes: RwLock<HashMap<String, PromoCode>>,
    inventory: Option<Arc<MemoryInventory>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stocked(inventory: Arc<MemoryInventory>) -> Self {
        Self {
            inventory: Some(inventory),
            ..Self::default()
        }
    }

    pub async fn upsert_product(&self, product: Product) {
        if let Some(inventory) = &self.inventory {
            inventory.set_stock(product.id, product.stock).await;
        }
        self.products.write().await.insert(product.id, product);
    }

    async fn with_live_stock(&self, mut product: Product) -> AppResult<Product> {
        if let Some(inventory) = &self.inventory {
            product.stock = inventory.available(product.id).await?;
        }
        Ok(product)
    }

    pub async fn upsert_seller(&self, seller: Seller) {
        self.sellers.write().await.insert(seller.id, seller);
    }

    pub async fn upsert_promo_code(&self, mut promo: PromoCode) {
        promo.code = PromoCode::normalize(&promo.code);
        self.promo_codes.write().await.insert(promo.code.clone(), promo);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn product(&self, id: Uuid) -> AppResult<Option<Product>> {
        let found = self.products.read().await.get(&id).cloned();
        match found {
            Some(product) => Ok(Some(self.with_live_stock(product).await?)),
            None => Ok(None),
        }
    }

    async fn products(&self, ids: &[Uuid]) -> AppResult<Vec<Product>> {
        let found: Vec<Product> = {
            let products = self.products.read().await;
            ids.iter().filter_map(|id| products.get(id).cloned()).collect()
        };
        let mut stocked = Vec::with_capacity(found.len());
        for product in found {
            stocked.push(self.with_live_stock(product).await?);
        }
        Ok(stocked)
    }

    async fn seller(&self, id: Uuid) -> AppResult<Option<Seller>> {
        Ok(self.sellers.read().await.get(&id).cloned())
    }

    async fn promo_code(&self, code: &str) -> AppResult<Option<PromoCode>> {
        Ok(self.promo_codes.read().await.get(code).cloned())
    }

    async fn redeem_promo_code(&self, code: &str) -> AppResult<bool> {
        let mut promo_codes = self.promo_codes.write().await;
        match promo_codes.get_mut(code) {
            Some(promo) if promo.is_active && !promo.is_exhausted() => {
                promo.used_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_promo_code(&self, code: &str) -> AppResult<()> {
        if let Some(promo) = self.promo_codes.write().await.get_mut(code) {
            promo.used_count = promo.used_count.saturating_sub(1);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct StoredCart {
    lines: Vec<CartLine>,
    touched: Instant,
}

/// Cart lines kept in process memory. Used for guest sessions, which carry
/// no durability promise, and for user carts when no database is configured.
#[derive(Debug)]
pub struct MemoryCartBackend {
    idle_ttl: Option<Duration>,
    carts: RwLock<HashMap<CartOwner, StoredCart>>,
}

impl MemoryCartBackend {
    pub fn new(idle_ttl: Option<Duration>) -> Self {
        Self {
            idle_ttl,
            carts: RwLock::new(HashMap::new()),
        }
    }

    /// Drops carts untouched for longer than the idle TTL.
    pub async fn purge_idle(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };
        let mut carts = self.carts.write().await;
        let before = carts.len();
        carts.retain(|_, cart| cart.touched.elapsed() < ttl);
        before - carts.len()
    }
}

#[async_trait]
impl CartBackend for MemoryCartBackend {
    async fn lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>> {
        Ok(self
            .carts
            .read()
            .await
            .get(owner)
            .map(|cart| cart.lines.clone())
            .unwrap_or_default())
    }

    async fn put(&self, owner: &CartOwner, product_id: Uuid, quantity: u32) -> AppResult<CartLine> {
        let mut carts = self.carts.write().await;
        let cart = carts.entry(owner.clone()).or_insert_with(|| StoredCart {
            lines: Vec::new(),
            touched: Instant::now(),
        });
        cart.touched = Instant::now();

        let line = CartLine { product_id, quantity };
        match cart.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(existing) => existing.quantity = quantity,
            None => cart.lines.push(line.clone()),
        }
        Ok(line)
    }

    async fn remove(&self, owner: &CartOwner, product_id: Uuid) -> AppResult<bool> {
        let mut carts = self.carts.write().await;
        let Some(cart) = carts.get_mut(owner) else {
            return Ok(false);
        };
        cart.touched = Instant::now();
        let before = cart.lines.len();
        cart.lines.retain(|l| l.product_id != product_id);
        Ok(cart.lines.len() != before)
    }

    async fn clear(&self, owner: &CartOwner) -> AppResult<()> {
        self.carts.write().await.remove(owner);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, OrderWithLines>>,
    commissions: RwLock<Vec<Commission>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order, lines: &[OrderLine]) -> AppResult<()> {
        self.orders.write().await.insert(
            order.id,
            OrderWithLines {
                order: order.clone(),
                lines: lines.to_vec(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<OrderWithLines>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<Order>, u64)> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .values()
            .map(|entry| &entry.order)
            .filter(|order| order.user_id == user_id)
            .filter(|order| status.is_none_or(|s| order.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Order>> {
        let mut orders = self.orders.write().await;
        let Some(entry) = orders.get_mut(&id) else {
            return Ok(None);
        };
        if entry.order.status != from {
            return Ok(None);
        }
        entry.order.status = to;
        entry.order.updated_at = at;
        if to == OrderStatus::Cancelled {
            entry.order.cancelled_at = Some(at);
        }
        Ok(Some(entry.order.clone()))
    }

    async fn set_payment_status(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Order>> {
        let mut orders = self.orders.write().await;
        let Some(entry) = orders.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&entry.order.payment_status) {
            return Ok(None);
        }
        entry.order.payment_status = to;
        entry.order.updated_at = at;
        if to == PaymentStatus::Paid {
            entry.order.paid_at = Some(at);
        }
        Ok(Some(entry.order.clone()))
    }

    async fn insert_commission(&self, commission: &Commission) -> AppResult<bool> {
        let mut commissions = self.commissions.write().await;
        let exists = commissions
            .iter()
            .any(|c| c.seller_id == commission.seller_id && c.order_id == commission.order_id);
        if exists {
            return Ok(false);
        }
        commissions.push(commission.clone());
        Ok(true)
    }

    async fn commissions(&self, order_id: Uuid) -> AppResult<Vec<Commission>> {
        Ok(self
            .commissions
            .read()
            .await
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_existing_line() {
        let backend = MemoryCartBackend::new(None);
        let owner = CartOwner::Guest("session-a".into());
        let product_id = Uuid::new_v4();

        backend.put(&owner, product_id, 2).await.unwrap();
        backend.put(&owner, product_id, 5).await.unwrap();

        let lines = backend.lines(&owner).await.unwrap();
        assert_eq!(lines, vec![CartLine { product_id, quantity: 5 }]);
    }

    #[tokio::test]
    async fn idle_guest_carts_are_purged() {
        let backend = MemoryCartBackend::new(Some(Duration::from_millis(10)));
        let owner = CartOwner::Guest("session-b".into());
        backend.put(&owner, Uuid::new_v4(), 1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;

        assert_eq!(backend.purge_idle().await, 1);
        assert!(backend.lines(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn redeem_stops_at_max_uses() {
        let catalog = MemoryCatalog::new();
        let now = Utc::now();
        catalog
            .upsert_promo_code(PromoCode {
                code: "once".into(),
                kind: crate::models::DiscountKind::Fixed,
                value: rust_decimal::Decimal::TEN,
                min_order_amount: rust_decimal::Decimal::ZERO,
                valid_from: now,
                valid_until: now,
                max_uses: Some(1),
                used_count: 0,
                is_active: true,
            })
            .await;

        assert!(catalog.redeem_promo_code("ONCE").await.unwrap());
        assert!(!catalog.redeem_promo_code("ONCE").await.unwrap());

        catalog.release_promo_code("ONCE").await.unwrap();
        assert!(catalog.redeem_promo_code("ONCE").await.unwrap());
    }
}
