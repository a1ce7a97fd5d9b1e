use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::pickup::LocationSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub initial_empty_bins: u64,
    /// Product types used to pre-populate a new pickup's planned allocation.
    #[serde(default)]
    pub default_products: Vec<String>,
}

impl Location {
    pub fn snapshot(&self) -> LocationSnapshot {
        LocationSnapshot {
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }

    pub fn matches(&self, snapshot: &LocationSnapshot) -> bool {
        self.name == snapshot.name && self.address == snapshot.address
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub locations: Vec<Location>,
}

impl Customer {
    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|location| location.name == name)
    }

    pub fn matching_location(&self, snapshot: &LocationSnapshot) -> Option<&Location> {
        self.locations
            .iter()
            .find(|location| location.matches(snapshot))
    }
}
