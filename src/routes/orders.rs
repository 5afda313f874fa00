use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CheckoutCreated, CheckoutRequest, CommissionList, OrderList, PaymentReport,
        UpdateOrderStatusRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_PAYMENT_GATEWAY, ensure_admin, ensure_any_role},
    models::OrderWithLines,
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", post(cancel_order))
        .route("/{id}/payment", post(record_payment))
        .route("/{id}/status", patch(update_status))
        .route("/{id}/commissions", get(list_commissions))
        .route("/{id}/commissions/repair", post(repair_commissions))
}

/// Loads an order the caller may see. Other users' orders look absent.
async fn visible_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<OrderWithLines> {
    let order = state.checkout.order(id).await?;
    if order.order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::NotFound);
    }
    Ok(order)
}

#[utoipa::path(
    post,
    path = "/api/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created from the cart", body = ApiResponse<CheckoutCreated>),
        (status = 400, description = "Empty cart or missing address"),
        (status = 409, description = "Insufficient stock or checkout already in progress"),
        (status = 422, description = "Promo code rejected"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CheckoutCreated>>)> {
    // Detached so a dropped connection cannot stop checkout between steps.
    let service = state.checkout.clone();
    let placed = tokio::spawn(async move { service.checkout(user.user_id, payload).await })
        .await
        .map_err(|err| AppError::Internal(err.into()))??;

    let data = CheckoutCreated {
        order_id: placed.order.id,
        invoice_number: placed.order.invoice_number.clone(),
        order: placed,
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Checkout success", data, Some(Meta::empty()))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders of the current user, newest first", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let (page, limit, offset) = query.pagination().normalize();
    let (items, total) = state
        .checkout
        .list_orders(user.user_id, query.status, limit as u64, offset as u64)
        .await?;

    let meta = Meta::new(page, limit, total as i64);
    Ok(Json(ApiResponse::success("Ok", OrderList { items }, Some(meta))))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with its lines", body = ApiResponse<OrderWithLines>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithLines>>> {
    let order = visible_order(&state, &user, id).await?;
    Ok(Json(ApiResponse::success("OK", order, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled and stock restored", body = ApiResponse<OrderWithLines>),
        (status = 409, description = "Order can no longer be cancelled"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithLines>>> {
    visible_order(&state, &user, id).await?;
    let order = state.checkout.cancel(id).await?;
    Ok(Json(ApiResponse::success("Order cancelled", order, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/payment",
    request_body = PaymentReport,
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment status applied", body = ApiResponse<OrderWithLines>),
        (status = 403, description = "Caller is not the payment gateway or an admin"),
        (status = 409, description = "Order is past pending"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentReport>,
) -> AppResult<Json<ApiResponse<OrderWithLines>>> {
    ensure_any_role(&user, &[ROLE_ADMIN, ROLE_PAYMENT_GATEWAY])?;
    let order = state.checkout.record_payment(id, payload.status).await?;
    Ok(Json(ApiResponse::success("Payment recorded", order, Some(Meta::empty()))))
}

#[utoipa::path(
    patch,
    path = "/api/orders/{id}/status",
    request_body = UpdateOrderStatusRequest,
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<OrderWithLines>),
        (status = 409, description = "Transition not allowed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<OrderWithLines>>> {
    ensure_admin(&user)?;
    let order = state.checkout.transition(id, payload.status).await?;
    Ok(Json(ApiResponse::success("Order updated", order, Some(Meta::empty()))))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}/commissions",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Commissions recorded for the order", body = ApiResponse<CommissionList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_commissions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CommissionList>>> {
    ensure_admin(&user)?;
    let items = state.checkout.commissions(id).await?;
    Ok(Json(ApiResponse::success("OK", CommissionList { items }, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/commissions/repair",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Missing commissions written", body = ApiResponse<CommissionList>),
        (status = 400, description = "Order is not confirmed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn repair_commissions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CommissionList>>> {
    ensure_admin(&user)?;
    let items = state.checkout.repair_commissions(id).await?;
    tracing::info!(order_id = %id, count = items.len(), "commission repair finished");
    Ok(Json(ApiResponse::success("Commissions repaired", CommissionList { items }, Some(Meta::empty()))))
}
