//! Demo sellers, products and promo codes.
//!
//! `bin/seed` writes them to Postgres. Without a database the in-memory
//! stores start from the same data.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    models::{DiscountKind, Product, PromoCode, Seller},
    repository::memory::MemoryCatalog,
};

// Fixed ids keep re-seeding idempotent.
pub const SELLER_FERRIS: Uuid = Uuid::from_u128(0x5e11e7_0001);
pub const SELLER_CRAB: Uuid = Uuid::from_u128(0x5e11e7_0002);
pub const DEMO_USER: Uuid = Uuid::from_u128(0xc0ffee_0001);
pub const DEMO_ADMIN: Uuid = Uuid::from_u128(0xc0ffee_0002);
pub const DEMO_GATEWAY: Uuid = Uuid::from_u128(0xc0ffee_0003);

#[derive(Debug, Clone)]
pub struct DemoData {
    pub sellers: Vec<Seller>,
    pub products: Vec<Product>,
    pub promo_codes: Vec<PromoCode>,
}

impl DemoData {
    /// Promo codes run from a day before `now` to 90 days after.
    pub fn new(now: DateTime<Utc>) -> Self {
        let sellers = vec![
            Seller {
                id: SELLER_FERRIS,
                name: "Ferris Goods".into(),
                commission_rate: Decimal::new(1000, 2),
            },
            Seller {
                id: SELLER_CRAB,
                name: "Crab Supply Co".into(),
                commission_rate: Decimal::new(750, 2),
            },
        ];

        let products = [
            (0x9d_0001, "Axum Hoodie", Decimal::new(55000, 2), Some(Decimal::new(45000, 2)), 50, Some(SELLER_FERRIS)),
            (0x9d_0002, "Ferris Mug", Decimal::new(12000, 2), None, 100, Some(SELLER_FERRIS)),
            (0x9d_0003, "Rust Sticker Pack", Decimal::new(5000, 2), None, 200, Some(SELLER_CRAB)),
            (0x9d_0004, "Limited Keyboard", Decimal::new(150000, 2), None, 3, Some(SELLER_CRAB)),
            (0x9d_0005, "House Gift Card", Decimal::new(10000, 2), None, 1000, None),
        ]
        .into_iter()
        .map(|(id, name, price, discount_price, stock, seller_id)| Product {
            id: Uuid::from_u128(id),
            name: name.into(),
            price,
            discount_price,
            discount_until: None,
            stock,
            seller_id,
            is_active: true,
        })
        .collect();

        let promo_codes = [
            ("WELCOME10", DiscountKind::Percentage, Decimal::from(10), Decimal::from(100), None),
            ("FLAT50", DiscountKind::Fixed, Decimal::from(50), Decimal::from(300), Some(100)),
            ("ONCE", DiscountKind::Fixed, Decimal::from(20), Decimal::ZERO, Some(1)),
        ]
        .into_iter()
        .map(|(code, kind, value, min_order_amount, max_uses)| PromoCode {
            code: code.into(),
            kind,
            value,
            min_order_amount,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(90),
            max_uses,
            used_count: 0,
            is_active: true,
        })
        .collect();

        Self {
            sellers,
            products,
            promo_codes,
        }
    }

    pub async fn load_into(self, catalog: &MemoryCatalog) {
        for seller in self.sellers {
            catalog.upsert_seller(seller).await;
        }
        for product in self.products {
            catalog.upsert_product(product).await;
        }
        for promo in self.promo_codes {
            catalog.upsert_promo_code(promo).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig, repository::Catalog, services::inventory::InventoryLedger,
        state::AppState,
    };

    #[tokio::test]
    async fn memory_mode_starts_with_demo_catalog() {
        let state = AppState::from_config(AppConfig::for_tests("demo-secret"))
            .await
            .unwrap();
        let hoodie = Uuid::from_u128(0x9d_0001);

        let product = state.catalog.product(hoodie).await.unwrap().unwrap();
        assert_eq!(product.stock, 50);
        assert_eq!(state.inventory.available(hoodie).await.unwrap(), 50);
        assert!(state.catalog.seller(SELLER_FERRIS).await.unwrap().is_some());
        assert!(state.catalog.promo_code("WELCOME10").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_catalog_stock_follows_the_ledger() {
        let state = AppState::from_config(AppConfig::for_tests("demo-secret"))
            .await
            .unwrap();
        let keyboard = Uuid::from_u128(0x9d_0004);

        let token = state.inventory.reserve(keyboard, 2).await.unwrap();
        state.inventory.commit(&token).await.unwrap();

        let product = state.catalog.product(keyboard).await.unwrap().unwrap();
        assert_eq!(product.stock, 1);
    }
}
