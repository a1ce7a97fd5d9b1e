use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::access;
use crate::engine::lookup::{self, BinBalance};
use crate::error::AppError;
use crate::models::access::{CallerContext, Permission};
use crate::models::customer::{Customer, Location};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customers", post(register_customer))
        .route(
            "/customers/:id/locations/:name/bins",
            get(location_bin_balance),
        )
}

#[derive(Deserialize)]
pub struct RegisterCustomerRequest {
    pub id: Option<Uuid>,
    pub name: String,
    pub locations: Vec<Location>,
}

async fn register_customer(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Json(payload): Json<RegisterCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    access::require(&caller, Permission::ManageCustomers)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if payload
        .locations
        .iter()
        .any(|location| location.name.trim().is_empty())
    {
        return Err(AppError::Validation(
            "location name cannot be empty".to_string(),
        ));
    }

    let customer = Customer {
        id: payload.id.unwrap_or_else(Uuid::new_v4),
        name: payload.name,
        locations: payload.locations,
    };

    state.customers.register(customer.clone()).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn location_bin_balance(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    Path((customer_id, name)): Path<(Uuid, String)>,
) -> Result<Json<BinBalance>, AppError> {
    Ok(Json(
        lookup::bin_balance(&state, &caller, customer_id, &name).await?,
    ))
}
