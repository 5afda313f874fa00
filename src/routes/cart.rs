use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartView, UpdateCartItemRequest},
    error::AppResult,
    middleware::auth::{AuthUser, CurrentCart, SessionId},
    models::CartLine,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/{product_id}", patch(update_item).delete(remove_item))
        .route("/merge", post(merge_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("x-session-id" = Option<String>, Header, description = "Guest session, used when no bearer token is sent")
    ),
    responses(
        (status = 200, description = "Cart priced at current prices", body = ApiResponse<CartView>),
        (status = 401, description = "Neither a bearer token nor a session id"),
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    CurrentCart(owner): CurrentCart,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let view = state.carts.view(&owner).await?;
    Ok(Json(ApiResponse::success("OK", view, Some(Meta::empty()))))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    params(
        ("x-session-id" = Option<String>, Header, description = "Guest session")
    ),
    responses(
        (status = 200, description = "Line added; quantity may be clamped to stock", body = ApiResponse<CartLine>),
        (status = 409, description = "Product sold out or unavailable"),
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    CurrentCart(owner): CurrentCart,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    let line = state
        .carts
        .add(&owner, payload.product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success("Added to cart", line, None)))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items/{product_id}",
    request_body = UpdateCartItemRequest,
    params(
        ("product_id" = Uuid, Path, description = "Product ID"),
        ("x-session-id" = Option<String>, Header, description = "Guest session")
    ),
    responses(
        (status = 200, description = "Line updated", body = ApiResponse<CartLine>),
        (status = 404, description = "Product not in cart"),
    ),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    CurrentCart(owner): CurrentCart,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    let line = state
        .carts
        .update(&owner, product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success("Cart updated", line, None)))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID"),
        ("x-session-id" = Option<String>, Header, description = "Guest session")
    ),
    responses(
        (status = 200, description = "OK", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Product not in cart"),
    ),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    CurrentCart(owner): CurrentCart,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    state.carts.remove(&owner, product_id).await?;
    Ok(Json(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    post,
    path = "/api/cart/merge",
    params(
        ("x-session-id" = String, Header, description = "Guest session to merge from")
    ),
    responses(
        (status = 200, description = "Guest cart merged into the user's cart", body = ApiResponse<Vec<CartLine>>),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn merge_cart(
    State(state): State<AppState>,
    user: AuthUser,
    SessionId(session): SessionId,
) -> AppResult<Json<ApiResponse<Vec<CartLine>>>> {
    let lines = state
        .carts
        .merge_guest_into_user(&session, user.user_id)
        .await?;
    Ok(Json(ApiResponse::success("Cart merged", lines, Some(Meta::empty()))))
}
