use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::pickup::Pickup;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PickupEventKind {
    Scheduled,
    Rescheduled,
    Completed,
    Cancelled,
    Deleted,
    InvoiceLinked,
    InvoiceStatusChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupEvent {
    pub kind: PickupEventKind,
    pub pickup: Pickup,
    pub at: DateTime<Utc>,
}

impl PickupEvent {
    pub fn new(kind: PickupEventKind, pickup: Pickup) -> Self {
        Self {
            kind,
            pickup,
            at: Utc::now(),
        }
    }
}
