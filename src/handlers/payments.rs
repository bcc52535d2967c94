use axum::{
    extract::{Path, State},
    Json,
};

use super::common::ValidatedJson;
use crate::auth::AuthUser;
use crate::dto::{GatewayCustomerResponse, PaymentResultResponse};
use crate::gateway::{CardSummary, PaymentIntent, SetupIntent};
use crate::services::payments::{CreatePaymentIntentInput, ProcessPaymentInput};
use crate::{ApiResponse, ApiResult, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/payments/customers",
    summary = "Get or create gateway customer",
    description = "Returns the caller's gateway customer id, creating the customer on first use",
    responses(
        (status = 200, description = "Gateway customer retrieved successfully", body = ApiResponse<GatewayCustomerResponse>),
        (status = 400, description = "Missing email or gateway failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn get_or_create_customer(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<GatewayCustomerResponse> {
    let customer = state
        .services
        .customers
        .customer_profile(&user.identity())
        .await?;
    Ok(Json(ApiResponse::success(
        "Gateway customer retrieved successfully",
        customer.into(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/setup-intents",
    summary = "Create setup intent",
    description = "Starts saving a card for later use",
    responses(
        (status = 200, description = "Setup intent created successfully", body = ApiResponse<SetupIntent>),
        (status = 400, description = "Gateway failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn create_setup_intent(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<SetupIntent> {
    let intent = state
        .services
        .payments
        .create_setup_intent(&user.identity())
        .await?;
    Ok(Json(ApiResponse::success(
        "Setup intent created successfully",
        intent,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/payment-intents",
    summary = "Create payment intent",
    request_body = CreatePaymentIntentInput,
    responses(
        (status = 200, description = "Payment intent created successfully", body = ApiResponse<PaymentIntent>),
        (status = 400, description = "Invalid amount or gateway failure", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<CreatePaymentIntentInput>,
) -> ApiResult<PaymentIntent> {
    let intent = state
        .services
        .payments
        .create_payment_intent(&user.identity(), input)
        .await?;
    Ok(Json(ApiResponse::success(
        "Payment intent created successfully",
        intent,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/process",
    summary = "Confirm payment",
    description = "Confirms a checkout payment intent and reconciles the order, invoice and transaction",
    request_body = ProcessPaymentInput,
    responses(
        (status = 200, description = "Payment processed successfully", body = ApiResponse<PaymentResultResponse>),
        (status = 400, description = "Payment failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment transaction not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn process_payment(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<ProcessPaymentInput>,
) -> ApiResult<PaymentResultResponse> {
    let outcome = state
        .services
        .payments
        .process_payment(user.user_id, input)
        .await?;
    Ok(Json(ApiResponse::success(
        "Payment processed successfully",
        outcome.into(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/customers/{id}/cards",
    summary = "List saved cards",
    params(("id" = String, Path, description = "Gateway customer ID")),
    responses(
        (status = 200, description = "Cards retrieved successfully", body = ApiResponse<Vec<CardSummary>>),
        (status = 403, description = "Access denied", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn list_customer_cards(
    State(state): State<AppState>,
    user: AuthUser,
    Path(customer_id): Path<String>,
) -> ApiResult<Vec<CardSummary>> {
    let cards = state
        .services
        .payments
        .list_cards(user.user_id, &customer_id)
        .await?;
    Ok(Json(ApiResponse::success("Cards retrieved successfully", cards)))
}
