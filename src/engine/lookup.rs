use uuid::Uuid;

use crate::engine::access;
use crate::engine::reconcile::location_bin_balance;
use crate::error::AppError;
use crate::models::access::{CallerContext, Permission};
use crate::models::pickup::{Pickup, PickupFilter};
use crate::state::AppState;

/// Reads a pickup and applies driver scoping, without a capability check.
pub async fn load_visible(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
) -> Result<Pickup, AppError> {
    let pickup = state
        .pickups
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("pickup {} not found", id)))?;

    access::ensure_assigned(caller, &pickup)?;
    Ok(pickup)
}

pub async fn get_pickup(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
) -> Result<Pickup, AppError> {
    access::require(caller, Permission::ViewPickups)?;
    load_visible(state, caller, id).await
}

pub async fn list_pickups(
    state: &AppState,
    caller: &CallerContext,
    filter: PickupFilter,
) -> Result<Vec<Pickup>, AppError> {
    access::require(caller, Permission::ViewPickups)?;
    let filter = access::scope_filter(caller, filter);

    Ok(state
        .pickups
        .list()
        .await?
        .into_iter()
        .filter(|pickup| filter.matches(pickup) && access::can_see(caller, pickup))
        .collect())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BinBalance {
    pub customer_id: Uuid,
    pub location: String,
    pub initial_empty_bins: u64,
    pub balance: i64,
}

pub async fn bin_balance(
    state: &AppState,
    caller: &CallerContext,
    customer_id: Uuid,
    location_name: &str,
) -> Result<BinBalance, AppError> {
    access::require(caller, Permission::ViewPickups)?;

    let customer = state
        .customers
        .customer(customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("customer {} not found", customer_id)))?;
    let location = customer.location(location_name).ok_or_else(|| {
        AppError::NotFound(format!(
            "location {} not found for customer {}",
            location_name, customer_id
        ))
    })?;

    let pickups = state.pickups.list().await?;
    let at_location = pickups.iter().filter(|pickup| {
        pickup.customer_id == customer_id && pickup.pickup_location.name == location.name
    });

    Ok(BinBalance {
        customer_id,
        location: location.name.clone(),
        initial_empty_bins: location.initial_empty_bins,
        balance: location_bin_balance(location.initial_empty_bins, at_location),
    })
}
