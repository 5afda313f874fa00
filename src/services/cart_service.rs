//! Cart lines for guests and signed-in users.
//!
//! Quantities stored here are advisory. They are clamped to the stock known at
//! edit time, but nothing is reserved until checkout.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    dto::cart::{CartItemView, CartView},
    error::{AppError, AppResult},
    models::{CartLine, CartOwner},
    repository::{CartBackend, Catalog},
    services::inventory::InventoryLedger,
};

pub struct CartStore {
    guests: Arc<dyn CartBackend>,
    users: Arc<dyn CartBackend>,
    catalog: Arc<dyn Catalog>,
    inventory: Arc<dyn InventoryLedger>,
    max_per_line: u32,
}

impl CartStore {
    pub fn new(
        guests: Arc<dyn CartBackend>,
        users: Arc<dyn CartBackend>,
        catalog: Arc<dyn Catalog>,
        inventory: Arc<dyn InventoryLedger>,
        max_per_line: u32,
    ) -> Self {
        Self {
            guests,
            users,
            catalog,
            inventory,
            max_per_line: max_per_line.max(1),
        }
    }

    fn backend(&self, owner: &CartOwner) -> &dyn CartBackend {
        match owner {
            CartOwner::Guest(_) => self.guests.as_ref(),
            CartOwner::User(_) => self.users.as_ref(),
        }
    }

    pub async fn get_lines(&self, owner: &CartOwner) -> AppResult<Vec<CartLine>> {
        self.backend(owner).lines(owner).await
    }

    /// Adds `quantity` on top of whatever the line already holds.
    pub async fn add(&self, owner: &CartOwner, product_id: Uuid, quantity: u32) -> AppResult<CartLine> {
        if quantity == 0 {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
        let current = self
            .get_lines(owner)
            .await?
            .into_iter()
            .find(|line| line.product_id == product_id)
            .map_or(0, |line| line.quantity);

        let quantity = self.clamp(product_id, current.saturating_add(quantity)).await?;
        let line = self.backend(owner).put(owner, product_id, quantity).await?;
        tracing::debug!(%owner, %product_id, quantity, "cart line added");
        Ok(line)
    }

    /// Replaces the line's quantity.
    pub async fn update(&self, owner: &CartOwner, product_id: Uuid, quantity: u32) -> AppResult<CartLine> {
        if quantity == 0 {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
        let exists = self
            .get_lines(owner)
            .await?
            .iter()
            .any(|line| line.product_id == product_id);
        if !exists {
            return Err(AppError::NotFound);
        }

        let quantity = self.clamp(product_id, quantity).await?;
        let line = self.backend(owner).put(owner, product_id, quantity).await?;
        tracing::debug!(%owner, %product_id, quantity, "cart line updated");
        Ok(line)
    }

    pub async fn remove(&self, owner: &CartOwner, product_id: Uuid) -> AppResult<()> {
        if !self.backend(owner).remove(owner, product_id).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn clear(&self, owner: &CartOwner) -> AppResult<()> {
        self.backend(owner).clear(owner).await
    }

    /// Moves a guest cart into the user's cart and empties the guest cart.
    ///
    /// Quantities for a product present in both carts are summed. The sum may
    /// exceed the per-line bound; merging never drops quantity.
    pub async fn merge_guest_into_user(&self, session_id: &str, user_id: Uuid) -> AppResult<Vec<CartLine>> {
        let guest = CartOwner::Guest(session_id.to_string());
        let user = CartOwner::User(user_id);

        let guest_lines = self.get_lines(&guest).await?;
        if guest_lines.is_empty() {
            return self.get_lines(&user).await;
        }

        let existing: HashMap<Uuid, u32> = self
            .get_lines(&user)
            .await?
            .into_iter()
            .map(|line| (line.product_id, line.quantity))
            .collect();

        for line in &guest_lines {
            let held = existing.get(&line.product_id).copied().unwrap_or(0);
            let quantity = merged_quantity(line.quantity, held);
            self.users.put(&user, line.product_id, quantity).await?;
        }
        self.guests.clear(&guest).await?;

        tracing::info!(%user_id, merged = guest_lines.len(), "guest cart merged");
        self.get_lines(&user).await
    }

    /// Lines joined with live product data. Products that vanished from the
    /// catalog are left out of the view but stay in storage.
    pub async fn view(&self, owner: &CartOwner) -> AppResult<CartView> {
        let lines = self.get_lines(owner).await?;
        let ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
        let products: HashMap<Uuid, _> = self
            .catalog
            .products(&ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let now = Utc::now();
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let Some(product) = products.get(&line.product_id) else {
                continue;
            };
            let unit_price = product.unit_price(now);
            items.push(CartItemView {
                product_id: product.id,
                name: product.name.clone(),
                unit_price,
                discount_percentage: product.discount_percentage(now),
                quantity: line.quantity,
                line_total: unit_price * Decimal::from(line.quantity),
                available: self.inventory.available(product.id).await?,
                is_active: product.is_active,
            });
        }

        let subtotal = items.iter().map(|item| item.line_total).sum();
        Ok(CartView { items, subtotal })
    }

    async fn clamp(&self, product_id: Uuid, requested: u32) -> AppResult<u32> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .filter(|product| product.is_active)
            .ok_or(AppError::ProductUnavailable { product_id })?;

        let available = self.inventory.available(product.id).await?;
        let quantity = requested.min(self.max_per_line).min(available);
        if quantity == 0 {
            return Err(AppError::InsufficientStock { product_id });
        }
        Ok(quantity)
    }
}

fn merged_quantity(guest: u32, user: u32) -> u32 {
    guest.saturating_add(user)
}
