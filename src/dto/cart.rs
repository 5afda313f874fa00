use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: u32,
}

/// Cart contents priced at today's prices. Checkout re-prices from scratch.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemView {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub discount_percentage: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
    /// Stock that could be reserved right now.
    pub available: u32,
    pub is_active: bool,
}
