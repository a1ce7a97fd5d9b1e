use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::access;
use crate::engine::lookup::load_visible;
use crate::engine::reconcile::{aggregate, validate_bins};
use crate::error::AppError;
use crate::models::access::{CallerContext, Permission};
use crate::models::event::{PickupEvent, PickupEventKind};
use crate::models::pickup::{Pickup, PickupStatus, ProductCollectionEntry};
use crate::state::AppState;

const SIGNATURE_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub empty_bins_delivered: i64,
    pub filled_bins_collected: i64,
    pub products: Vec<ProductCollectionEntry>,
    pub signature: Vec<u8>,
}

/// Moves a scheduled pickup to completed. Either everything is committed or
/// the pickup stays scheduled, so callers retry the whole operation.
pub async fn complete(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
    completion: Completion,
) -> Result<Pickup, AppError> {
    let start = Instant::now();
    let result = complete_pickup(state, caller, id, completion).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(err) if err.is_retryable() => "retryable",
        Err(_) => "rejected",
    };
    state
        .metrics
        .pickup_completion_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result
}

async fn complete_pickup(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
    completion: Completion,
) -> Result<Pickup, AppError> {
    access::require(caller, Permission::CompletePickup)?;

    let current = load_visible(state, caller, id).await?;
    if current.status != PickupStatus::Scheduled {
        return Err(AppError::InvalidTransition {
            id,
            from: current.status,
            action: "complete",
        });
    }
    if completion.signature.is_empty() {
        return Err(AppError::MissingSignature);
    }

    let bins = validate_bins(
        completion.empty_bins_delivered,
        completion.filled_bins_collected,
    )?;
    let products = aggregate(&completion.products)?;

    // Each attempt gets its own key so a retry never overwrites the blob a
    // concurrent winner may already reference.
    let key = format!("signatures/{id}/{}.png", Uuid::new_v4());
    let stored = state
        .signatures
        .put(&key, SIGNATURE_CONTENT_TYPE, completion.signature)
        .await
        .inspect_err(|err| {
            warn!(pickup_id = %id, error = %err, "signature upload failed; pickup left scheduled");
        })?;
    debug!(pickup_id = %id, signature_key = %stored.key, "signature stored");

    let scope = caller.clone();
    let signature_url = stored.url.clone();
    let committed = state
        .pickups
        .update(
            id,
            Box::new(move |pickup| {
                if pickup.status != PickupStatus::Scheduled {
                    return Err(AppError::InvalidTransition {
                        id,
                        from: pickup.status,
                        action: "complete",
                    });
                }
                access::ensure_assigned(&scope, pickup)?;

                pickup.empty_bins_delivered = bins.empty_delivered;
                pickup.filled_bins_collected = bins.filled_collected;
                pickup.products_collected = products;
                pickup.signature = Some(signature_url);
                pickup.status = PickupStatus::Completed;
                pickup.updated_at = Utc::now();
                Ok(())
            }),
        )
        .await;

    let completed = match committed {
        Ok(pickup) => pickup,
        Err(err) => {
            warn!(
                pickup_id = %id,
                signature_key = %stored.key,
                error = %err,
                "completion not committed; signature blob is orphaned"
            );
            return Err(err);
        }
    };

    state.metrics.record_transition("completed");
    state.metrics.pickups_open.dec();
    state.publish(PickupEvent::new(PickupEventKind::Completed, completed.clone()));

    info!(
        pickup_id = %id,
        driver_id = %completed.driver_id,
        empty_bins_delivered = completed.empty_bins_delivered,
        filled_bins_collected = completed.filled_bins_collected,
        products = completed.products_collected.len(),
        "pickup completed"
    );

    Ok(completed)
}
