use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::access;
use crate::engine::lookup::load_visible;
use crate::engine::reconcile::aggregate;
use crate::error::AppError;
use crate::models::access::{CallerContext, Permission};
use crate::models::customer::Location;
use crate::models::event::{PickupEvent, PickupEventKind};
use crate::models::pickup::{
    InvoiceStatus, LocationSnapshot, Pickup, PickupStatus, ProductCollectionEntry,
};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleRequest {
    pub customer_id: Option<Uuid>,
    pub location: Option<LocationSnapshot>,
    pub driver_id: Option<Uuid>,
    pub pickup_date: Option<NaiveDateTime>,
    /// `None` pre-populates from the location's default product types.
    pub planned_products: Option<Vec<ProductCollectionEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReschedulePatch {
    pub customer_id: Option<Uuid>,
    pub location: Option<LocationSnapshot>,
    pub driver_id: Option<Uuid>,
    pub pickup_date: Option<NaiveDateTime>,
    pub planned_products: Option<Vec<ProductCollectionEntry>>,
}

impl ReschedulePatch {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none()
            && self.location.is_none()
            && self.driver_id.is_none()
            && self.pickup_date.is_none()
            && self.planned_products.is_none()
    }
}

fn missing_field(field: &str) -> AppError {
    AppError::Validation(format!("{field} is required"))
}

async fn resolve_location(
    state: &AppState,
    customer_id: Uuid,
    snapshot: &LocationSnapshot,
) -> Result<Location, AppError> {
    let customer = state
        .customers
        .customer(customer_id)
        .await?
        .ok_or_else(|| AppError::Validation(format!("unknown customer {customer_id}")))?;

    customer
        .matching_location(snapshot)
        .cloned()
        .ok_or_else(|| {
            AppError::Validation(format!(
                "location {} is not one of customer {}'s locations",
                snapshot.name, customer_id
            ))
        })
}

async fn ensure_known_driver(state: &AppState, driver_id: Uuid) -> Result<(), AppError> {
    match state.roles.resolve(driver_id).await? {
        Some((_, permissions)) if permissions.allows(Permission::CompletePickup) => Ok(()),
        Some((role, _)) => Err(AppError::Validation(format!(
            "{driver_id} has role {role} and cannot perform pickups"
        ))),
        None => Err(AppError::Validation(format!("unknown driver {driver_id}"))),
    }
}

fn ensure_self_assigned(caller: &CallerContext, driver_id: Uuid) -> Result<(), AppError> {
    if caller.is_driver_scoped() && driver_id != caller.identity {
        return Err(AppError::Forbidden(
            "drivers can only assign pickups to themselves".to_string(),
        ));
    }
    Ok(())
}

fn planned_allocation(
    location: &Location,
    requested: Option<Vec<ProductCollectionEntry>>,
) -> Result<Vec<ProductCollectionEntry>, AppError> {
    match requested {
        Some(entries) => aggregate(&entries),
        None => {
            let defaults: Vec<ProductCollectionEntry> = location
                .default_products
                .iter()
                .map(|name| ProductCollectionEntry::new(name.clone(), 0.0))
                .collect();
            aggregate(&defaults)
        }
    }
}

pub async fn schedule(
    state: &AppState,
    caller: &CallerContext,
    request: ScheduleRequest,
) -> Result<Pickup, AppError> {
    access::require(caller, Permission::AddPickup)?;

    let customer_id = request
        .customer_id
        .ok_or_else(|| missing_field("customer_id"))?;
    let driver_id = request.driver_id.ok_or_else(|| missing_field("driver_id"))?;
    let pickup_date = request
        .pickup_date
        .ok_or_else(|| missing_field("pickup_date"))?;
    let snapshot = request.location.ok_or_else(|| missing_field("location"))?;

    ensure_self_assigned(caller, driver_id)?;
    let location = resolve_location(state, customer_id, &snapshot).await?;
    ensure_known_driver(state, driver_id).await?;
    let planned_products = planned_allocation(&location, request.planned_products)?;

    let now = Utc::now();
    let pickup = Pickup {
        id: Uuid::new_v4(),
        customer_id,
        driver_id,
        pickup_location: location.snapshot(),
        pickup_date,
        empty_bins_delivered: 0,
        filled_bins_collected: 0,
        planned_products,
        products_collected: Vec::new(),
        signature: None,
        status: PickupStatus::Scheduled,
        invoice_status: InvoiceStatus::Unknown,
        invoice_reference: None,
        created_at: now,
        updated_at: now,
    };

    state.pickups.insert(pickup.clone()).await?;
    state.metrics.record_transition("scheduled");
    state.metrics.pickups_open.inc();
    state.publish(PickupEvent::new(PickupEventKind::Scheduled, pickup.clone()));

    info!(
        pickup_id = %pickup.id,
        customer_id = %customer_id,
        driver_id = %driver_id,
        pickup_date = %pickup_date,
        "pickup scheduled"
    );

    Ok(pickup)
}

pub async fn reschedule(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
    patch: ReschedulePatch,
) -> Result<Pickup, AppError> {
    access::require(caller, Permission::EditPickup)?;
    if patch.is_empty() {
        return Err(AppError::Validation("reschedule patch is empty".to_string()));
    }

    let current = load_visible(state, caller, id).await?;
    if current.status != PickupStatus::Scheduled {
        return Err(AppError::InvalidTransition {
            id,
            from: current.status,
            action: "reschedule",
        });
    }

    let customer_id = patch.customer_id.unwrap_or(current.customer_id);
    let location = match &patch.location {
        Some(snapshot) => Some(resolve_location(state, customer_id, snapshot).await?),
        None if customer_id != current.customer_id => {
            return Err(AppError::Validation(
                "changing the customer requires a location".to_string(),
            ));
        }
        None => None,
    };

    if let Some(driver_id) = patch.driver_id {
        ensure_self_assigned(caller, driver_id)?;
        ensure_known_driver(state, driver_id).await?;
    }

    let planned_products = patch
        .planned_products
        .as_deref()
        .map(aggregate)
        .transpose()?;

    let scope = caller.clone();
    let updated = state
        .pickups
        .update(
            id,
            Box::new(move |pickup| {
                if pickup.status != PickupStatus::Scheduled {
                    return Err(AppError::InvalidTransition {
                        id,
                        from: pickup.status,
                        action: "reschedule",
                    });
                }
                access::ensure_assigned(&scope, pickup)?;

                pickup.customer_id = customer_id;
                if let Some(location) = location {
                    pickup.pickup_location = location.snapshot();
                }
                if let Some(driver_id) = patch.driver_id {
                    pickup.driver_id = driver_id;
                }
                if let Some(pickup_date) = patch.pickup_date {
                    pickup.pickup_date = pickup_date;
                }
                if let Some(planned_products) = planned_products {
                    pickup.planned_products = planned_products;
                }
                pickup.updated_at = Utc::now();
                Ok(())
            }),
        )
        .await?;

    state.metrics.record_transition("rescheduled");
    state.publish(PickupEvent::new(
        PickupEventKind::Rescheduled,
        updated.clone(),
    ));
    info!(pickup_id = %id, driver_id = %updated.driver_id, "pickup rescheduled");

    Ok(updated)
}

pub async fn cancel(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
) -> Result<Pickup, AppError> {
    access::require(caller, Permission::EditPickup)?;
    load_visible(state, caller, id).await?;

    let cancelled = state
        .pickups
        .update(
            id,
            Box::new(move |pickup| {
                if pickup.status != PickupStatus::Scheduled {
                    return Err(AppError::InvalidTransition {
                        id,
                        from: pickup.status,
                        action: "cancel",
                    });
                }
                pickup.status = PickupStatus::Cancelled;
                pickup.updated_at = Utc::now();
                Ok(())
            }),
        )
        .await?;

    state.metrics.record_transition("cancelled");
    state.metrics.pickups_open.dec();
    state.publish(PickupEvent::new(PickupEventKind::Cancelled, cancelled.clone()));
    info!(pickup_id = %id, "pickup cancelled");

    Ok(cancelled)
}

/// Completed pickups are financial history and cannot be deleted.
pub async fn delete(state: &AppState, caller: &CallerContext, id: Uuid) -> Result<(), AppError> {
    access::require(caller, Permission::DeletePickup)?;
    load_visible(state, caller, id).await?;

    let removed = state
        .pickups
        .remove(
            id,
            Box::new(move |pickup| {
                if pickup.status == PickupStatus::Completed {
                    return Err(AppError::InvalidTransition {
                        id,
                        from: pickup.status,
                        action: "delete",
                    });
                }
                Ok(())
            }),
        )
        .await?;

    if removed.status == PickupStatus::Scheduled {
        state.metrics.pickups_open.dec();
    }
    state.metrics.record_transition("deleted");
    state.publish(PickupEvent::new(PickupEventKind::Deleted, removed));
    info!(pickup_id = %id, "pickup deleted");

    Ok(())
}

/// Records which external invoice bills this pickup. The invoice status itself
/// is only ever changed by the synchronizer.
pub async fn link_invoice(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
    reference: &str,
) -> Result<Pickup, AppError> {
    access::require(caller, Permission::EditPickup)?;
    let reference = reference.trim().to_string();
    if reference.is_empty() {
        return Err(missing_field("invoice reference"));
    }
    load_visible(state, caller, id).await?;

    let linked = state
        .pickups
        .update(
            id,
            Box::new(move |pickup| {
                if pickup.status == PickupStatus::Cancelled {
                    return Err(AppError::InvalidTransition {
                        id,
                        from: pickup.status,
                        action: "invoice",
                    });
                }
                if pickup.invoice_reference.as_deref() == Some(reference.as_str()) {
                    return Ok(());
                }
                if pickup.invoice_status.is_terminal() {
                    return Err(AppError::Validation(format!(
                        "invoice for pickup {id} is already {}",
                        pickup.invoice_status
                    )));
                }
                pickup.invoice_reference = Some(reference);
                pickup.updated_at = Utc::now();
                Ok(())
            }),
        )
        .await?;

    state.publish(PickupEvent::new(PickupEventKind::InvoiceLinked, linked.clone()));
    info!(
        pickup_id = %id,
        invoice_reference = linked.invoice_reference.as_deref().unwrap_or_default(),
        "invoice linked"
    );

    Ok(linked)
}
