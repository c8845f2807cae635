use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::models::{InventoryItem, InventoryPage, StockLevel};
use crate::store::InventoryStore;

const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStockRequest {
    pub product_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal(context: &str, e: anyhow::Error) -> ApiError {
    tracing::error!("{}: {:#}", context, e);
    error(StatusCode::INTERNAL_SERVER_ERROR, context)
}

pub fn create_router<S>(store: S) -> Router
where
    S: InventoryStore + Clone + 'static,
{
    Router::new()
        .route("/inventory", get(list_inventory::<S>))
        .route("/inventory/batch", post(batch_stock::<S>))
        .route(
            "/inventory/:product_id",
            get(get_stock::<S>)
                .put(set_stock::<S>)
                .patch(adjust_stock::<S>),
        )
        .route("/health", get(health_check))
        .with_state(store)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn get_stock<S: InventoryStore + Clone + 'static>(
    State(store): State<S>,
    Path(product_id): Path<String>,
) -> Result<Json<StockLevel>, ApiError> {
    store
        .stock(&product_id)
        .await
        .map(Json)
        .map_err(|e| internal("Failed to read stock", e))
}

pub async fn set_stock<S: InventoryStore + Clone + 'static>(
    State(store): State<S>,
    Path(product_id): Path<String>,
    Json(request): Json<SetStockRequest>,
) -> Result<Json<InventoryItem>, ApiError> {
    if request.quantity < 0 {
        return Err(error(
            StatusCode::BAD_REQUEST,
            format!("quantity must not be negative, got {}", request.quantity),
        ));
    }

    let item = store
        .set_stock(&product_id, request.quantity)
        .await
        .map_err(|e| internal("Failed to set stock", e))?;
    tracing::info!(%product_id, quantity = item.quantity, "Stock set");
    Ok(Json(item))
}

pub async fn adjust_stock<S: InventoryStore + Clone + 'static>(
    State(store): State<S>,
    Path(product_id): Path<String>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Json<InventoryItem>, ApiError> {
    let item = store
        .adjust_stock(&product_id, request.delta)
        .await
        .map_err(|e| internal("Failed to adjust stock", e))?;
    tracing::info!(%product_id, delta = request.delta, quantity = item.quantity, "Stock adjusted");
    Ok(Json(item))
}

pub async fn batch_stock<S: InventoryStore + Clone + 'static>(
    State(store): State<S>,
    Json(request): Json<BatchStockRequest>,
) -> Result<Json<Vec<StockLevel>>, ApiError> {
    store
        .stocks(&request.product_ids)
        .await
        .map(Json)
        .map_err(|e| internal("Failed to read stock", e))
}

pub async fn list_inventory<S: InventoryStore + Clone + 'static>(
    State(store): State<S>,
    Query(params): Query<PageParams>,
) -> Result<Json<InventoryPage>, ApiError> {
    let page = params.page.unwrap_or(0);
    let size = params.size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 0 || size <= 0 {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "page must be >= 0 and size must be > 0",
        ));
    }
    if page.checked_mul(size).is_none() {
        return Err(error(StatusCode::BAD_REQUEST, "page is out of range"));
    }

    store
        .list(page, size)
        .await
        .map(Json)
        .map_err(|e| internal("Failed to list inventory", e))
}

pub async fn health_check() -> &'static str {
    "OK"
}
