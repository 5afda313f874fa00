use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Commission, Order, OrderStatus, OrderWithLines, PaymentStatus};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub promo_code: Option<String>,
    pub shipping_address: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentReport {
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutCreated {
    pub order_id: Uuid,
    pub invoice_number: String,
    pub order: OrderWithLines,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommissionList {
    pub items: Vec<Commission>,
}
