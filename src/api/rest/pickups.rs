use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::execution::{self, Completion};
use crate::engine::invoice_sync::{self, RefreshOutcome};
use crate::engine::lookup;
use crate::engine::scheduler::{self, ReschedulePatch, ScheduleRequest};
use crate::error::AppError;
use crate::models::access::CallerContext;
use crate::models::pickup::{Pickup, PickupFilter, ProductCollectionEntry};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pickups", post(schedule_pickup).get(list_pickups))
        .route(
            "/pickups/:id",
            get(get_pickup)
                .patch(reschedule_pickup)
                .delete(delete_pickup),
        )
        .route("/pickups/:id/complete", post(complete_pickup))
        .route("/pickups/:id/cancel", post(cancel_pickup))
        .route("/pickups/:id/invoice", put(link_invoice))
        .route("/pickups/:id/invoice/refresh", post(refresh_invoice))
}

#[derive(Deserialize)]
pub struct CompletePickupRequest {
    pub empty_bins_delivered: i64,
    pub filled_bins_collected: i64,
    #[serde(default)]
    pub products: Vec<ProductCollectionEntry>,
    /// Base64 image, optionally as a `data:` URL.
    #[serde(default)]
    pub signature: String,
}

#[derive(Deserialize)]
pub struct LinkInvoiceRequest {
    pub reference: String,
}

fn decode_signature(raw: &str) -> Result<Vec<u8>, AppError> {
    let encoded = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    STANDARD
        .decode(encoded)
        .map_err(|err| AppError::Validation(format!("signature is not valid base64: {err}")))
}

async fn schedule_pickup(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Json(payload): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<Pickup>), AppError> {
    let pickup = scheduler::schedule(&state, &caller, payload).await?;
    Ok((StatusCode::CREATED, Json(pickup)))
}

async fn list_pickups(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Query(filter): Query<PickupFilter>,
) -> Result<Json<Vec<Pickup>>, AppError> {
    Ok(Json(lookup::list_pickups(&state, &caller, filter).await?))
}

async fn get_pickup(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Pickup>, AppError> {
    Ok(Json(lookup::get_pickup(&state, &caller, id).await?))
}

async fn reschedule_pickup(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<ReschedulePatch>,
) -> Result<Json<Pickup>, AppError> {
    Ok(Json(scheduler::reschedule(&state, &caller, id, patch).await?))
}

async fn delete_pickup(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    scheduler::delete(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_pickup(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompletePickupRequest>,
) -> Result<Json<Pickup>, AppError> {
    let completion = Completion {
        empty_bins_delivered: payload.empty_bins_delivered,
        filled_bins_collected: payload.filled_bins_collected,
        products: payload.products,
        signature: decode_signature(&payload.signature)?,
    };

    Ok(Json(
        execution::complete(&state, &caller, id, completion).await?,
    ))
}

async fn cancel_pickup(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Pickup>, AppError> {
    Ok(Json(scheduler::cancel(&state, &caller, id).await?))
}

async fn link_invoice(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<LinkInvoiceRequest>,
) -> Result<Json<Pickup>, AppError> {
    Ok(Json(
        scheduler::link_invoice(&state, &caller, id, &payload.reference).await?,
    ))
}

async fn refresh_invoice(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<RefreshOutcome>, AppError> {
    Ok(Json(
        invoice_sync::refresh_invoice_status(&state, &caller, id).await?,
    ))
}
