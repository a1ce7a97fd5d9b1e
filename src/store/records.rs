use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::pickup::Pickup;

/// Read-modify-write applied to a copy of the stored pickup. Returning an
/// error discards the copy, so a rejected mutation never leaves partial state.
pub type Mutation<'a> = Box<dyn FnOnce(&mut Pickup) -> Result<(), AppError> + Send + 'a>;

pub type RemovalGuard<'a> = Box<dyn FnOnce(&Pickup) -> Result<(), AppError> + Send + 'a>;

#[async_trait]
pub trait PickupStore: Send + Sync {
    async fn insert(&self, pickup: Pickup) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Pickup>, AppError>;

    async fn list(&self) -> Result<Vec<Pickup>, AppError>;

    /// Atomically applies `mutation` to the pickup. The record is only
    /// rewritten when the mutation actually changed it.
    async fn update(&self, id: Uuid, mutation: Mutation<'_>) -> Result<Pickup, AppError>;

    async fn remove(&self, id: Uuid, guard: RemovalGuard<'_>) -> Result<Pickup, AppError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryPickupStore {
    pickups: DashMap<Uuid, Pickup>,
}

impl InMemoryPickupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(id: Uuid) -> AppError {
    AppError::NotFound(format!("pickup {} not found", id))
}

#[async_trait]
impl PickupStore for InMemoryPickupStore {
    async fn insert(&self, pickup: Pickup) -> Result<(), AppError> {
        match self.pickups.entry(pickup.id) {
            Entry::Occupied(_) => Err(AppError::Internal(format!(
                "pickup {} already exists",
                pickup.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(pickup);
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Pickup>, AppError> {
        Ok(self.pickups.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Pickup>, AppError> {
        let mut pickups: Vec<Pickup> = self
            .pickups
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        pickups.sort_by(|a, b| a.pickup_date.cmp(&b.pickup_date).then(a.id.cmp(&b.id)));
        Ok(pickups)
    }

    async fn update(&self, id: Uuid, mutation: Mutation<'_>) -> Result<Pickup, AppError> {
        // The entry lock is held for the whole read-modify-write, which is
        // what serializes racing transitions on the same pickup.
        let mut current = self.pickups.get_mut(&id).ok_or_else(|| missing(id))?;

        let mut next = current.value().clone();
        mutation(&mut next)?;

        if next != *current.value() {
            *current.value_mut() = next.clone();
        }

        Ok(next)
    }

    async fn remove(&self, id: Uuid, guard: RemovalGuard<'_>) -> Result<Pickup, AppError> {
        match self.pickups.entry(id) {
            Entry::Occupied(slot) => {
                guard(slot.get())?;
                Ok(slot.remove())
            }
            Entry::Vacant(_) => Err(missing(id)),
        }
    }

    fn len(&self) -> usize {
        self.pickups.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::{InMemoryPickupStore, PickupStore};
    use crate::error::AppError;
    use crate::models::pickup::{InvoiceStatus, LocationSnapshot, Pickup, PickupStatus};

    fn scheduled() -> Pickup {
        let now = Utc::now();
        Pickup {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            pickup_location: LocationSnapshot {
                name: "Main".to_string(),
                address: "2 Market St".to_string(),
            },
            pickup_date: NaiveDate::from_ymd_opt(2026, 11, 2)
                .and_then(|d| d.and_hms_opt(8, 30, 0))
                .expect("valid date"),
            empty_bins_delivered: 0,
            filled_bins_collected: 0,
            planned_products: Vec::new(),
            products_collected: Vec::new(),
            signature: None,
            status: PickupStatus::Scheduled,
            invoice_status: InvoiceStatus::Unknown,
            invoice_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_record_untouched() {
        let store = InMemoryPickupStore::new();
        let pickup = scheduled();
        store.insert(pickup.clone()).await.unwrap();

        let result = store
            .update(
                pickup.id,
                Box::new(|p| {
                    p.empty_bins_delivered = 99;
                    Err(AppError::MissingSignature)
                }),
            )
            .await;

        assert!(matches!(result, Err(AppError::MissingSignature)));
        assert_eq!(store.get(pickup.id).await.unwrap(), Some(pickup));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryPickupStore::new();
        let pickup = scheduled();
        store.insert(pickup.clone()).await.unwrap();

        assert!(store.insert(pickup).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn guarded_remove_keeps_record_when_guard_fails() {
        let store = InMemoryPickupStore::new();
        let pickup = scheduled();
        store.insert(pickup.clone()).await.unwrap();

        let result = store
            .remove(pickup.id, Box::new(|_| Err(AppError::Forbidden("no".into()))))
            .await;
        assert!(result.is_err());
        assert_eq!(store.len(), 1);

        let removed = store.remove(pickup.id, Box::new(|_| Ok(()))).await.unwrap();
        assert_eq!(removed.id, pickup.id);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_on_missing_pickup_is_not_found() {
        let store = InMemoryPickupStore::new();
        let result = store.update(Uuid::new_v4(), Box::new(|_| Ok(()))).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
