use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::access;
use crate::engine::lookup::load_visible;
use crate::error::AppError;
use crate::models::access::{CallerContext, Permission};
use crate::models::event::{PickupEvent, PickupEventKind};
use crate::models::pickup::{InvoiceStatus, Pickup};
use crate::state::AppState;
use crate::store::accounting::{ExternalInvoice, ExternalInvoiceState, SyncFailure};

const SWEEP_CONCURRENCY: usize = 8;

pub fn map_external_status(invoice: &ExternalInvoice, now: DateTime<Utc>) -> InvoiceStatus {
    match invoice.status {
        ExternalInvoiceState::Paid => InvoiceStatus::Paid,
        ExternalInvoiceState::Voided | ExternalInvoiceState::Deleted => InvoiceStatus::Cancelled,
        ExternalInvoiceState::Authorised => match invoice.due_date {
            Some(due_date) if due_date < now => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Pending,
        },
        ExternalInvoiceState::Draft | ExternalInvoiceState::Submitted => InvoiceStatus::Pending,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub pickup_id: Uuid,
    pub invoice_status: InvoiceStatus,
    pub changed: bool,
    /// The accounting system could not be consulted; `invoice_status` is the
    /// last known value.
    pub stale: bool,
}

impl RefreshOutcome {
    fn kept(pickup: &Pickup, stale: bool) -> Self {
        Self {
            pickup_id: pickup.id,
            invoice_status: pickup.invoice_status,
            changed: false,
            stale,
        }
    }
}

pub async fn refresh_invoice_status(
    state: &AppState,
    caller: &CallerContext,
    id: Uuid,
) -> Result<RefreshOutcome, AppError> {
    access::require(caller, Permission::ViewPickups)?;
    let pickup = load_visible(state, caller, id).await?;
    Ok(refresh_loaded(state, pickup).await)
}

/// Only fails when the pickup does not exist; accounting trouble degrades to
/// the last known status.
pub async fn refresh(state: &AppState, id: Uuid) -> Result<RefreshOutcome, AppError> {
    let pickup = state
        .pickups
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("pickup {} not found", id)))?;
    Ok(refresh_loaded(state, pickup).await)
}

async fn lookup(state: &AppState, reference: &str) -> Result<ExternalInvoice, SyncFailure> {
    match timeout(state.sync_timeout, state.accounting.fetch_invoice(reference)).await {
        Ok(result) => result,
        Err(_) => Err(SyncFailure::Timeout(state.sync_timeout)),
    }
}

async fn refresh_loaded(state: &AppState, pickup: Pickup) -> RefreshOutcome {
    let record = |outcome: &str| {
        state
            .metrics
            .invoice_refresh_total
            .with_label_values(&[outcome])
            .inc();
    };

    if pickup.invoice_status.is_terminal() {
        record("terminal");
        return RefreshOutcome::kept(&pickup, false);
    }
    let Some(reference) = pickup.invoice_reference.clone() else {
        record("no_reference");
        return RefreshOutcome::kept(&pickup, false);
    };

    let invoice = match lookup(state, &reference).await {
        Ok(invoice) => invoice,
        Err(failure) => {
            warn!(
                pickup_id = %pickup.id,
                invoice_reference = %reference,
                reason = failure.label(),
                error = %failure,
                "invoice lookup failed; keeping last known status"
            );
            record("stale");
            return RefreshOutcome::kept(&pickup, true);
        }
    };

    let mapped = map_external_status(&invoice, Utc::now());
    if mapped == pickup.invoice_status {
        record("unchanged");
        return RefreshOutcome::kept(&pickup, false);
    }

    let id = pickup.id;
    let mut applied = false;
    let written = state
        .pickups
        .update(
            id,
            Box::new(|current| {
                // A concurrent refresh, a relink or a terminal status all mean
                // this result no longer applies.
                let superseded = current.invoice_status.is_terminal()
                    || current.invoice_status == mapped
                    || current.invoice_reference.as_deref() != Some(reference.as_str());
                if !superseded {
                    current.invoice_status = mapped;
                    current.updated_at = Utc::now();
                    applied = true;
                }
                Ok(())
            }),
        )
        .await;

    let updated = match written {
        Ok(updated) => updated,
        Err(err) => {
            warn!(pickup_id = %id, error = %err, "failed to persist refreshed invoice status");
            record("stale");
            return RefreshOutcome::kept(&pickup, true);
        }
    };

    let changed = applied;
    if changed {
        record("changed");
        info!(
            pickup_id = %id,
            from = %pickup.invoice_status,
            to = %updated.invoice_status,
            "invoice status changed"
        );
        state.publish(PickupEvent::new(
            PickupEventKind::InvoiceStatusChanged,
            updated.clone(),
        ));
    } else {
        record("unchanged");
    }

    RefreshOutcome {
        pickup_id: id,
        invoice_status: updated.invoice_status,
        changed,
        stale: false,
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub changed: usize,
    pub stale: usize,
}

/// Refreshes every pickup that has an invoice reference and a non-terminal
/// status. One failing pickup never aborts the sweep.
pub async fn refresh_all(state: &AppState) -> Result<SweepSummary, AppError> {
    let candidates: Vec<Pickup> = state
        .pickups
        .list()
        .await?
        .into_iter()
        .filter(|pickup| {
            pickup.invoice_reference.is_some() && !pickup.invoice_status.is_terminal()
        })
        .collect();

    let outcomes: Vec<RefreshOutcome> = futures::stream::iter(candidates)
        .map(|pickup| refresh_loaded(state, pickup))
        .buffer_unordered(SWEEP_CONCURRENCY)
        .collect()
        .await;

    Ok(SweepSummary {
        checked: outcomes.len(),
        changed: outcomes.iter().filter(|outcome| outcome.changed).count(),
        stale: outcomes.iter().filter(|outcome| outcome.stale).count(),
    })
}

pub async fn run_invoice_sync(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "invoice sync started");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match refresh_all(&state).await {
            Ok(summary) if summary.changed > 0 || summary.stale > 0 => info!(
                checked = summary.checked,
                changed = summary.changed,
                stale = summary.stale,
                "invoice sweep finished"
            ),
            Ok(summary) => debug!(checked = summary.checked, "invoice sweep finished"),
            Err(err) => error!(error = %err, "invoice sweep failed"),
        }
    }
}
