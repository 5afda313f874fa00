use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, raw_pool},
    demo::DemoData,
    repository::{
        CartBackend, Catalog, OrderStore,
        memory::{MemoryCartBackend, MemoryCatalog, MemoryOrderStore},
        postgres::{PgCartBackend, PgCatalog, PgOrderStore},
    },
    services::{
        cart_service::CartStore,
        checkout_service::CheckoutService,
        inventory::{InventoryLedger, MemoryInventory},
        inventory_pg::PgInventory,
        notification::{AuditLogNotifier, FanoutNotifier, NotificationDispatcher, TracingNotifier},
        pricing::PricingEngine,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<dyn Catalog>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub carts: Arc<CartStore>,
    pub checkout: Arc<CheckoutService>,
    pub guest_carts: Arc<MemoryCartBackend>,
    pub orm: Option<OrmConn>,
}

impl AppState {
    /// Connects to Postgres when `DATABASE_URL` is set. Otherwise every store
    /// runs in memory, starting from the demo catalog; nothing survives a restart.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        match config.database_url.clone() {
            Some(url) => {
                let orm = create_orm_conn(&url).await?;
                Ok(Self::postgres(config, orm))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores seeded with demo data");
                let inventory = Arc::new(MemoryInventory::new(config.reservation_ttl));
                let catalog = Arc::new(MemoryCatalog::stocked(inventory.clone()));
                DemoData::new(Utc::now()).load_into(&catalog).await;
                Ok(Self::in_memory(config, catalog, inventory))
            }
        }
    }

    pub fn in_memory(config: AppConfig, catalog: Arc<MemoryCatalog>, inventory: Arc<MemoryInventory>) -> Self {
        Self::assemble(
            config,
            catalog,
            inventory,
            Arc::new(MemoryCartBackend::new(None)),
            Arc::new(MemoryOrderStore::new()),
            Arc::new(TracingNotifier),
            None,
        )
    }

    pub fn postgres(config: AppConfig, orm: OrmConn) -> Self {
        let notifier = FanoutNotifier::new(vec![
            Arc::new(TracingNotifier),
            Arc::new(AuditLogNotifier::new(raw_pool(&orm))),
        ]);
        let inventory = PgInventory::new(orm.clone(), config.reservation_ttl);
        Self::assemble(
            config,
            Arc::new(PgCatalog::new(orm.clone())),
            Arc::new(inventory),
            Arc::new(PgCartBackend::new(orm.clone())),
            Arc::new(PgOrderStore::new(orm.clone())),
            Arc::new(notifier),
            Some(orm),
        )
    }

    fn assemble(
        config: AppConfig,
        catalog: Arc<dyn Catalog>,
        inventory: Arc<dyn InventoryLedger>,
        user_carts: Arc<dyn CartBackend>,
        orders: Arc<dyn OrderStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        orm: Option<OrmConn>,
    ) -> Self {
        let guest_carts = Arc::new(MemoryCartBackend::new(Some(config.guest_cart_ttl)));
        let carts = Arc::new(CartStore::new(
            guest_carts.clone(),
            user_carts,
            catalog.clone(),
            inventory.clone(),
            config.max_qty_per_line,
        ));
        let checkout = Arc::new(CheckoutService::new(
            carts.clone(),
            catalog.clone(),
            inventory.clone(),
            orders,
            PricingEngine::new(config.shipping.clone()),
            notifier,
        ));

        Self {
            config: Arc::new(config),
            catalog,
            inventory,
            carts,
            checkout,
            guest_carts,
            orm,
        }
    }

    /// One pass of the background sweepers: expired reservations and idle guest carts.
    pub async fn sweep(&self) {
        if let Err(err) = self.inventory.release_expired().await {
            tracing::warn!(error = %err, "reservation sweep failed");
        }
        let purged = self.guest_carts.purge_idle().await;
        if purged > 0 {
            tracing::info!(count = purged, "idle guest carts purged");
        }
    }
}
