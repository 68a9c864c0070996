//! HTTP surface over a [`PointStore`].
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | POST | `/addresses/` | created address |
//! | GET | `/addresses/?latitude=..&longitude=..&distance=..` | bare array of addresses |
//! | GET | `/addresses/get-list` | `{"addresses": [..]}` |
//! | PUT | `/addresses/{id}` | updated address |
//! | DELETE | `/addresses/{id}` | `{"message": "Address deleted successfully"}` |
//!
//! Failures carry `{"detail": "<message>"}`.

use crate::error::LocusError;
use crate::proximity::{ProximityQuery, DEFAULT_RADIUS_KM};
use crate::spatial::Coordinate;
use crate::storage::PointStore;
use crate::types::{Address, AddressId, AddressPatch, NewAddress};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub const NOT_FOUND_DETAIL: &str = "Address not found";
pub const DELETED_MESSAGE: &str = "Address deleted successfully";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PointStore>,
    /// Radius applied when a proximity request omits `distance`
    pub default_radius_km: f64,
}

impl AppState {
    pub fn new(store: Arc<dyn PointStore>) -> Self {
        Self {
            store,
            default_radius_km: DEFAULT_RADIUS_KM,
        }
    }

    pub fn with_default_radius_km(mut self, radius_km: f64) -> Self {
        self.default_radius_km = radius_km;
        self
    }
}

/// Query string of a proximity request.
#[derive(Debug, Clone, Deserialize)]
pub struct ProximityParams {
    pub latitude: f64,
    pub longitude: f64,
    pub distance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddressList {
    pub addresses: Vec<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Error response: a status plus a `detail` message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<LocusError> for ApiError {
    fn from(err: LocusError) -> Self {
        match err {
            LocusError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                detail: NOT_FOUND_DETAIL.to_string(),
            },
            LocusError::Validation(_) | LocusError::InvalidCoordinate { .. } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                detail: err.to_string(),
            },
            other => {
                error!(error = %other, "request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: other.to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        LocusError::Validation(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        LocusError::Validation(rejection.body_text()).into()
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        LocusError::Validation(rejection.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the router. Collection paths answer with and without the trailing slash.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/addresses/", get(find_nearby).post(create_address))
        .route("/addresses", get(find_nearby).post(create_address))
        .route("/addresses/get-list", get(list_addresses))
        .route("/addresses/:id", put(update_address).delete(delete_address))
        .with_state(state)
}

async fn create_address(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewAddress>, JsonRejection>,
) -> ApiResult<Address> {
    let Json(new) = body?;
    let address = state.store.insert(new)?;
    debug!(id = address.id, "created address");
    Ok(Json(address))
}

async fn list_addresses(State(state): State<AppState>) -> ApiResult<AddressList> {
    let addresses = state.store.list_all()?;
    Ok(Json(AddressList { addresses }))
}

async fn find_nearby(
    State(state): State<AppState>,
    params: std::result::Result<Query<ProximityParams>, QueryRejection>,
) -> ApiResult<Vec<Address>> {
    let Query(params) = params?;
    let query = ProximityQuery::new(
        Coordinate::new(params.latitude, params.longitude),
        params.distance.unwrap_or(state.default_radius_km),
    );
    let found = state.store.find_within_radius(&query)?;
    debug!(
        reference = %query.reference,
        radius_km = query.radius_km,
        matches = found.len(),
        "proximity query"
    );
    Ok(Json(found))
}

async fn update_address(
    State(state): State<AppState>,
    id: std::result::Result<Path<AddressId>, PathRejection>,
    body: std::result::Result<Json<AddressPatch>, JsonRejection>,
) -> ApiResult<Address> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Json(state.store.update(id, patch)?))
}

async fn delete_address(
    State(state): State<AppState>,
    id: std::result::Result<Path<AddressId>, PathRejection>,
) -> ApiResult<MessageBody> {
    let Path(id) = id?;
    state.store.delete(id)?;
    Ok(Json(MessageBody {
        message: DELETED_MESSAGE.to_string(),
    }))
}

/// Serve `state` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
