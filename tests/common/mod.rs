#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use marketplace_checkout::{
    dto::orders::CheckoutRequest,
    models::{DiscountKind, Order, Product, PromoCode, Seller},
    repository::memory::{MemoryCartBackend, MemoryCatalog, MemoryOrderStore},
    services::{
        cart_service::CartStore,
        checkout_service::CheckoutService,
        inventory::MemoryInventory,
        notification::{NotificationDispatcher, OrderEvent},
        pricing::{PricingEngine, ShippingPolicy},
    },
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Collects every event it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(OrderEvent, Uuid)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(OrderEvent, Uuid)> {
        self.events.lock().unwrap().clone()
    }

    /// Notifications run on spawned tasks; give them a moment to land.
    pub async fn wait_for(&self, event: OrderEvent, order_id: Uuid) -> bool {
        for _ in 0..50 {
            if self.events().contains(&(event, order_id)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(&self, event: OrderEvent, order: &Order) -> anyhow::Result<()> {
        self.events.lock().unwrap().push((event, order.id));
        Ok(())
    }
}

pub struct World {
    pub catalog: Arc<MemoryCatalog>,
    pub inventory: Arc<MemoryInventory>,
    pub carts: Arc<CartStore>,
    pub checkout: Arc<CheckoutService>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn world() -> World {
    world_with(ShippingPolicy::default(), Duration::from_secs(300))
}

pub fn world_with(shipping: ShippingPolicy, reservation_ttl: Duration) -> World {
    let catalog = Arc::new(MemoryCatalog::new());
    let inventory = Arc::new(MemoryInventory::new(reservation_ttl));
    let notifier = Arc::new(RecordingNotifier::default());
    let carts = Arc::new(CartStore::new(
        Arc::new(MemoryCartBackend::new(None)),
        Arc::new(MemoryCartBackend::new(None)),
        catalog.clone(),
        inventory.clone(),
        99,
    ));
    let checkout = Arc::new(CheckoutService::new(
        carts.clone(),
        catalog.clone(),
        inventory.clone(),
        Arc::new(MemoryOrderStore::new()),
        PricingEngine::new(shipping),
        notifier.clone(),
    ));

    World {
        catalog,
        inventory,
        carts,
        checkout,
        notifier,
    }
}

/// Registers a product in the catalog and gives it `stock` units.
pub async fn add_product(
    catalog: &MemoryCatalog,
    inventory: &MemoryInventory,
    price: Decimal,
    discount_price: Option<Decimal>,
    stock: u32,
    seller_id: Option<Uuid>,
) -> Uuid {
    let product = Product {
        id: Uuid::new_v4(),
        name: format!("Product {price}"),
        price,
        discount_price,
        discount_until: None,
        stock,
        seller_id,
        is_active: true,
    };
    let id = product.id;
    inventory.set_stock(id, stock).await;
    catalog.upsert_product(product).await;
    id
}

impl World {
    pub async fn product(&self, price: Decimal, discount_price: Option<Decimal>, stock: u32) -> Uuid {
        add_product(&self.catalog, &self.inventory, price, discount_price, stock, None).await
    }

    pub async fn seller_product(&self, seller_id: Uuid, price: Decimal, stock: u32) -> Uuid {
        add_product(&self.catalog, &self.inventory, price, None, stock, Some(seller_id)).await
    }

    pub async fn seller(&self, commission_rate: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog
            .upsert_seller(Seller {
                id,
                name: format!("Seller {commission_rate}%"),
                commission_rate,
            })
            .await;
        id
    }

    pub async fn promo(
        &self,
        code: &str,
        kind: DiscountKind,
        value: Decimal,
        min_order_amount: Decimal,
        max_uses: Option<u32>,
        used_count: u32,
    ) {
        let now = Utc::now();
        self.catalog
            .upsert_promo_code(PromoCode {
                code: code.to_string(),
                kind,
                value,
                min_order_amount,
                valid_from: now - chrono::Duration::days(1),
                valid_until: now + chrono::Duration::days(1),
                max_uses,
                used_count,
                is_active: true,
            })
            .await;
    }
}

pub fn checkout_request(promo_code: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
        promo_code: promo_code.map(str::to_string),
        shipping_address: "Jl. Sudirman 10, Jakarta".to_string(),
    }
}
