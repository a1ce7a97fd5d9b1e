use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl PickupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickupStatus::Scheduled => "scheduled",
            PickupStatus::Completed => "completed",
            PickupStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local mirror of the external accounting system's invoice state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Unknown,
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    /// Once terminal, the synchronizer never touches the status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unknown => "unknown",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy of a customer location taken when the pickup was scheduled. Later
/// edits to the customer's master data never flow back into it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationSnapshot {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductCollectionEntry {
    pub product_name: String,
    pub quantity: f64,
}

impl ProductCollectionEntry {
    pub fn new(product_name: impl Into<String>, quantity: f64) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pickup {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub driver_id: Uuid,
    pub pickup_location: LocationSnapshot,
    /// Wall-clock time in the operating region.
    pub pickup_date: NaiveDateTime,
    pub empty_bins_delivered: u64,
    pub filled_bins_collected: u64,
    pub planned_products: Vec<ProductCollectionEntry>,
    pub products_collected: Vec<ProductCollectionEntry>,
    pub signature: Option<String>,
    pub status: PickupStatus,
    pub invoice_status: InvoiceStatus,
    pub invoice_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query-side filter for listing pickups. Every populated field must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickupFilter {
    pub status: Option<PickupStatus>,
    pub invoice_status: Option<InvoiceStatus>,
    pub driver_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl PickupFilter {
    pub fn matches(&self, pickup: &Pickup) -> bool {
        self.status.is_none_or(|status| pickup.status == status)
            && self
                .invoice_status
                .is_none_or(|status| pickup.invoice_status == status)
            && self.driver_id.is_none_or(|id| pickup.driver_id == id)
            && self.customer_id.is_none_or(|id| pickup.customer_id == id)
            && self.from.is_none_or(|from| pickup.pickup_date >= from)
            && self.to.is_none_or(|to| pickup.pickup_date <= to)
    }
}
