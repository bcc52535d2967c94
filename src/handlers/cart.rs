use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::common::ValidatedJson;
use crate::auth::AuthUser;
use crate::dto::{CartItemResponse, CartResponse};
use crate::services::cart::{AddToCartInput, CartLine, UpdateCartItemInput};
use crate::{ApiResponse, ApiResult, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/cart",
    summary = "Add to cart",
    description = "Adds a product or increases the quantity of an existing cart line",
    request_body = AddToCartInput,
    responses(
        (status = 200, description = "Item added to cart successfully", body = ApiResponse<CartItemResponse>),
        (status = 400, description = "Invalid quantity or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<AddToCartInput>,
) -> ApiResult<CartItemResponse> {
    let item = state.services.cart.add_to_cart(user.user_id, input).await?;
    let product = state.services.catalog.get_product(item.product_id).await?;
    let line = CartLine {
        item,
        product: Some(product),
    };

    Ok(Json(ApiResponse::success(
        "Item added to cart successfully",
        line.into(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get cart",
    responses(
        (status = 200, description = "Cart retrieved successfully", body = ApiResponse<CartResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartResponse> {
    let view = state.services.cart.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(
        "Cart retrieved successfully",
        view.into(),
    )))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/{product_id}",
    summary = "Update cart item quantity",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateCartItemInput,
    responses(
        (status = 200, description = "Cart item updated successfully", body = ApiResponse<CartItemResponse>),
        (status = 400, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateCartItemInput>,
) -> ApiResult<CartItemResponse> {
    let item = state
        .services
        .cart
        .update_cart_item(user.user_id, product_id, input)
        .await?;
    let product = state.services.catalog.get_product(product_id).await?;
    let line = CartLine {
        item,
        product: Some(product),
    };

    Ok(Json(ApiResponse::success(
        "Cart item updated successfully",
        line.into(),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/{product_id}",
    summary = "Remove cart item",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Item removed from cart successfully"),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> ApiResult<()> {
    state
        .services
        .cart
        .remove_from_cart(user.user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::message("Item removed from cart successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    summary = "Clear cart",
    responses((status = 200, description = "Cart cleared successfully")),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<()> {
    state.services.cart.clear(user.user_id).await?;
    Ok(Json(ApiResponse::message("Cart cleared successfully")))
}
