use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartItemView, CartView, UpdateCartItemRequest},
        orders::{
            CheckoutCreated, CheckoutRequest, CommissionList, OrderList, PaymentReport,
            UpdateOrderStatusRequest,
        },
    },
    models::{CartLine, Commission, Order, OrderLine, OrderStatus, OrderWithLines, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::{cart, health, orders},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::merge_cart,
        orders::checkout,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::record_payment,
        orders::update_status,
        orders::list_commissions,
        orders::repair_commissions
    ),
    components(
        schemas(
            CartLine,
            CartView,
            CartItemView,
            AddToCartRequest,
            UpdateCartItemRequest,
            CheckoutRequest,
            CheckoutCreated,
            PaymentReport,
            UpdateOrderStatusRequest,
            Order,
            OrderLine,
            OrderWithLines,
            OrderStatus,
            PaymentStatus,
            OrderList,
            Commission,
            CommissionList,
            Meta,
            ApiResponse<CartView>,
            ApiResponse<CheckoutCreated>,
            ApiResponse<OrderWithLines>,
            ApiResponse<OrderList>,
            ApiResponse<CommissionList>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Guest and user carts"),
        (name = "Checkout", description = "Cart to order conversion"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Order administration and commissions"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
