use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{NewOrder, Order};
use crate::store::{Created, OrderStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub status: String,
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

pub fn create_router<S>(store: S) -> Router
where
    S: OrderStore + Clone + 'static,
{
    Router::new()
        .route("/orders", post(create_order::<S>))
        .route("/orders/:id", get(get_order::<S>))
        .route("/health", get(health_check))
        .with_state(store)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_order<S: OrderStore + Clone + 'static>(
    State(store): State<S>,
    Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let order = Order::place(request).map_err(|e| error(StatusCode::BAD_REQUEST, e.to_string()))?;

    match store.create(order).await {
        Ok(created) => {
            let code = match &created {
                Created::Placed(order) => {
                    tracing::info!("Created order {} for product {}", order.id, order.product_id);
                    StatusCode::CREATED
                }
                Created::Existing(order) => {
                    tracing::info!("Order {} already exists, returning it", order.id);
                    StatusCode::OK
                }
            };
            let order = created.order();
            Ok((
                code,
                Json(CreateOrderResponse {
                    order_id: order.id,
                    status: order.status.clone(),
                }),
            ))
        }
        Err(e) => {
            tracing::error!("Failed to create order: {:#}", e);
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create order: {}", e),
            ))
        }
    }
}

pub async fn get_order<S: OrderStore + Clone + 'static>(
    State(store): State<S>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    match store.find(id).await {
        Ok(Some(order)) => Ok(Json(order)),
        Ok(None) => Err(error(StatusCode::NOT_FOUND, format!("Order {} not found", id))),
        Err(e) => {
            tracing::error!("Failed to load order {}: {:#}", id, e);
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load order"))
        }
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}
