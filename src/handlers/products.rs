use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::common::{PaginationParams, ValidatedJson};
use crate::auth::AdminUser;
use crate::dto::ProductResponse;
use crate::errors::ServiceError;
use crate::services::catalog::CreateProductInput;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    description = "Active products, newest first",
    params(PaginationParams),
    responses(
        (status = 200, description = "Products retrieved successfully", body = ApiResponse<PaginatedResponse<ProductResponse>>),
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<ProductResponse>> {
    let (page, limit) = params.resolve(&state.config);
    let (products, total) = state.services.catalog.list_products(page, limit).await?;
    let items = products.into_iter().map(ProductResponse::from).collect();

    Ok(Json(ApiResponse::success(
        "Products retrieved successfully",
        PaginatedResponse::new(items, total, page, limit),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved successfully", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductResponse> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(
        "Product retrieved successfully",
        product.into(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created successfully", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin access required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    ValidatedJson(input): ValidatedJson<CreateProductInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    let product = state.services.catalog.create_product(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Product created successfully",
            product.into(),
        )),
    ))
}
