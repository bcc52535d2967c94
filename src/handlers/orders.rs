use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{PaginationParams, ValidatedJson};
use crate::auth::{AdminUser, AuthUser};
use crate::dto::{CheckoutResponse, OrderResponse};
use crate::entities::{OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::services::orders::CreateOrderInput;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

/// Unknown status strings are rejected during deserialization
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Checkout",
    description = "Converts the caller's cart into an order, an invoice and a payment intent in one transaction",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created successfully", body = ApiResponse<CheckoutResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Empty cart, insufficient stock, invalid address or gateway failure", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<CreateOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let outcome = state
        .services
        .orders
        .create_order_from_cart(user.identity(), input)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Order created successfully",
            outcome.into(),
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "Order history",
    description = "The caller's orders, newest first, with items, invoice and payment transactions",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderResponse>> {
    let (page, limit) = params.resolve(&state.config);
    let (orders, total) = state
        .services
        .orders
        .get_order_history(user.user_id, page, limit)
        .await?;
    let items = orders.into_iter().map(OrderResponse::from).collect();

    Ok(Json(ApiResponse::success(
        "Orders retrieved successfully",
        PaginatedResponse::new(items, total, page, limit),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let details = state.services.orders.get_order(id, user.user_id).await?;
    Ok(Json(ApiResponse::success(
        "Order retrieved successfully",
        details.into(),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Cancels a pending order and restores the reserved stock",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled successfully", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order cannot be cancelled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state.services.orders.cancel_order(id, user.user_id).await?;
    Ok(Json(ApiResponse::success(
        "Order cancelled successfully",
        order.into(),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated successfully", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .update_order_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(
        "Order status updated successfully",
        order.into(),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/payment-status",
    summary = "Update payment status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Payment status updated successfully", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdatePaymentStatusRequest>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .orders
        .update_payment_status(id, request.payment_status)
        .await?;
    Ok(Json(ApiResponse::success(
        "Payment status updated successfully",
        order.into(),
    )))
}
