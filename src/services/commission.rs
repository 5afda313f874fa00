use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Commission, Order, OrderLine, round_money},
    repository::Catalog,
};

/// Splits an order's value into one commission per seller.
#[derive(Clone)]
pub struct CommissionCalculator {
    catalog: Arc<dyn Catalog>,
}

impl CommissionCalculator {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Lines without a seller, or whose seller is gone from the catalog, are
    /// logged and left out. They still count towards the order totals.
    pub async fn compute(&self, order: &Order, lines: &[OrderLine]) -> AppResult<Vec<Commission>> {
        let mut bases: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for line in lines {
            match line.seller_id {
                Some(seller_id) => *bases.entry(seller_id).or_default() += line.line_total,
                None => tracing::warn!(
                    order_id = %order.id,
                    product_id = %line.product_id,
                    "order line has no seller, skipped for commission"
                ),
            }
        }

        let now = Utc::now();
        let mut commissions = Vec::with_capacity(bases.len());
        for (seller_id, base_amount) in bases {
            let Some(seller) = self.catalog.seller(seller_id).await? else {
                tracing::warn!(order_id = %order.id, %seller_id, "seller not found, skipped for commission");
                continue;
            };
            commissions.push(Commission {
                id: Uuid::new_v4(),
                seller_id,
                order_id: order.id,
                rate: seller.commission_rate,
                base_amount,
                amount: round_money(seller.commission_rate * base_amount / Decimal::ONE_HUNDRED),
                created_at: now,
            });
        }

        Ok(commissions)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        models::{OrderStatus, PaymentStatus, Seller},
        repository::memory::MemoryCatalog,
    };

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            invoice_number: "INV-20260101-abcdef12".into(),
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            subtotal: dec!(1150),
            shipping_cost: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            grand_total: dec!(1150),
            promo_code: None,
            shipping_address: "Jl. Merdeka 1".into(),
            paid_at: Some(now),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(order_id: Uuid, seller_id: Option<Uuid>, total: Decimal) -> OrderLine {
        OrderLine {
            id: Uuid::new_v4(),
            order_id,
            product_id: Uuid::new_v4(),
            product_name: "Item".into(),
            seller_id,
            unit_price: total,
            quantity: 1,
            line_total: total,
        }
    }

    #[tokio::test]
    async fn one_commission_per_seller_and_orphans_skipped() {
        let catalog = Arc::new(MemoryCatalog::new());
        let seller_a = Uuid::new_v4();
        let seller_b = Uuid::new_v4();
        catalog
            .upsert_seller(Seller {
                id: seller_a,
                name: "A".into(),
                commission_rate: dec!(10),
            })
            .await;
        catalog
            .upsert_seller(Seller {
                id: seller_b,
                name: "B".into(),
                commission_rate: dec!(7.5),
            })
            .await;

        let order = order();
        let lines = vec![
            line(order.id, Some(seller_a), dec!(500)),
            line(order.id, Some(seller_a), dec!(300)),
            line(order.id, Some(seller_b), dec!(250)),
            line(order.id, None, dec!(100)),
        ];

        let calculator = CommissionCalculator::new(catalog);
        let commissions = calculator.compute(&order, &lines).await.unwrap();

        assert_eq!(commissions.len(), 2);
        let a = commissions.iter().find(|c| c.seller_id == seller_a).unwrap();
        assert_eq!(a.base_amount, dec!(800));
        assert_eq!(a.amount, dec!(80));
        let b = commissions.iter().find(|c| c.seller_id == seller_b).unwrap();
        assert_eq!(b.base_amount, dec!(250));
        assert_eq!(b.amount, dec!(18.75));
    }

    #[tokio::test]
    async fn amount_is_rounded_to_cents() {
        let catalog = Arc::new(MemoryCatalog::new());
        let seller = Uuid::new_v4();
        catalog
            .upsert_seller(Seller {
                id: seller,
                name: "Rounding".into(),
                commission_rate: dec!(12.5),
            })
            .await;

        let order = order();
        let lines = vec![line(order.id, Some(seller), dec!(10.02))];
        let commissions = CommissionCalculator::new(catalog)
            .compute(&order, &lines)
            .await
            .unwrap();

        // 12.5% of 10.02 = 1.2525
        assert_eq!(commissions[0].amount, dec!(1.25));
    }
}
