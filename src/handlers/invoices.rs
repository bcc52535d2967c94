use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{PaginationParams, ValidatedJson};
use crate::auth::{AdminUser, AuthUser};
use crate::dto::InvoiceResponse;
use crate::entities::InvoiceStatus;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateInvoiceStatusRequest {
    pub status: InvoiceStatus,
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/my",
    summary = "My invoices",
    responses(
        (status = 200, description = "Invoices retrieved successfully", body = ApiResponse<Vec<InvoiceResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Invoices"
)]
pub async fn list_my_invoices(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<InvoiceResponse>> {
    let invoices = state
        .services
        .invoices
        .list_invoices_for_user(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(
        "Invoices retrieved successfully",
        invoices.into_iter().map(InvoiceResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    summary = "Get invoice",
    description = "Visible to the invoice owner and to admins",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice retrieved successfully", body = ApiResponse<InvoiceResponse>),
        (status = 403, description = "Access denied", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<InvoiceResponse> {
    let details = state
        .services
        .invoices
        .get_invoice(id, user.user_id, user.is_admin())
        .await?;
    Ok(Json(ApiResponse::success(
        "Invoice retrieved successfully",
        details.into(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    summary = "All invoices",
    params(PaginationParams),
    responses(
        (status = 200, description = "All invoices retrieved successfully", body = ApiResponse<PaginatedResponse<InvoiceResponse>>),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Invoices"
)]
pub async fn list_all_invoices(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<InvoiceResponse>> {
    let (page, limit) = params.resolve(&state.config);
    let (invoices, total) = state
        .services
        .invoices
        .list_all_invoices(page, limit)
        .await?;
    let items = invoices.into_iter().map(InvoiceResponse::from).collect();

    Ok(Json(ApiResponse::success(
        "All invoices retrieved successfully",
        PaginatedResponse::new(items, total, page, limit),
    )))
}

#[utoipa::path(
    patch,
    path = "/api/v1/invoices/{id}/status",
    summary = "Update invoice status",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = UpdateInvoiceStatusRequest,
    responses(
        (status = 200, description = "Invoice status updated successfully", body = ApiResponse<InvoiceResponse>),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Invoices"
)]
pub async fn update_invoice_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateInvoiceStatusRequest>,
) -> ApiResult<InvoiceResponse> {
    let invoice = state
        .services
        .invoices
        .update_invoice_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(
        "Invoice status updated successfully",
        invoice.into(),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/invoices/{id}",
    summary = "Delete invoice",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice deleted successfully"),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Invoices"
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.services.invoices.delete_invoice(id).await?;
    Ok(Json(ApiResponse::message("Invoice deleted successfully")))
}
