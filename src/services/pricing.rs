//! Cart and order pricing.
//!
//! Everything here is a pure computation over already-loaded products and an
//! already-resolved promo code. Lookups happen in the checkout service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{DiscountKind, Product, PromoCode, round_money},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShippingPolicy {
    pub flat_rate: Decimal,
    /// Orders whose discounted subtotal reaches this amount ship free.
    pub free_over: Option<Decimal>,
}

impl ShippingPolicy {
    pub fn cost_for(&self, discounted_subtotal: Decimal) -> Decimal {
        match self.free_over {
            Some(threshold) if discounted_subtotal >= threshold => Decimal::ZERO,
            _ => self.flat_rate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PricingInput<'a> {
    pub product: &'a Product,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PricingResult {
    pub lines: Vec<PricedLine>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount_amount: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    shipping: ShippingPolicy,
}

impl PricingEngine {
    pub fn new(shipping: ShippingPolicy) -> Self {
        Self { shipping }
    }

    pub fn price_cart(
        &self,
        lines: &[PricingInput<'_>],
        promo: Option<&PromoCode>,
        now: DateTime<Utc>,
    ) -> AppResult<PricingResult> {
        let priced: Vec<PricedLine> = lines
            .iter()
            .map(|input| {
                let unit_price = input.product.unit_price(now);
                PricedLine {
                    product_id: input.product.id,
                    unit_price,
                    quantity: input.quantity,
                    line_total: unit_price * Decimal::from(input.quantity),
                }
            })
            .collect();

        let subtotal: Decimal = priced.iter().map(|line| line.line_total).sum();

        let discount_amount = match promo {
            Some(promo) => promo_discount(promo, subtotal, now)?,
            None => Decimal::ZERO,
        };

        let shipping_cost = self.shipping.cost_for(subtotal - discount_amount);
        let grand_total = subtotal + shipping_cost - discount_amount;

        Ok(PricingResult {
            lines: priced,
            subtotal,
            shipping_cost,
            discount_amount,
            grand_total,
        })
    }
}

/// Discount granted by `promo` on `subtotal`; never more than the subtotal itself.
pub fn promo_discount(promo: &PromoCode, subtotal: Decimal, now: DateTime<Utc>) -> AppResult<Decimal> {
    if !promo.is_redeemable_at(now) {
        return Err(AppError::InvalidPromoCode(promo.code.clone()));
    }
    if subtotal < promo.min_order_amount {
        return Err(AppError::PromoMinimumNotMet {
            minimum: promo.min_order_amount,
            subtotal,
        });
    }

    let raw = match promo.kind {
        DiscountKind::Percentage => round_money(subtotal * promo.value / Decimal::ONE_HUNDRED),
        DiscountKind::Fixed => promo.value,
    };

    Ok(raw.max(Decimal::ZERO).min(subtotal))
}
