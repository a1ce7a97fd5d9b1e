use std::collections::HashMap;

use serde::Serialize;

use crate::error::AppError;
use crate::models::pickup::{Pickup, PickupStatus, ProductCollectionEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BinCounts {
    pub empty_delivered: u64,
    pub filled_collected: u64,
}

impl BinCounts {
    pub fn net_delta(&self) -> i64 {
        net_bin_delta(self.empty_delivered, self.filled_collected)
    }
}

/// Collected may exceed delivered: bins can already be on site from earlier
/// visits, so only negativity is rejected.
pub fn validate_bins(delivered: i64, collected: i64) -> Result<BinCounts, AppError> {
    let invalid = || AppError::InvalidBinCount {
        delivered,
        collected,
    };
    Ok(BinCounts {
        empty_delivered: u64::try_from(delivered).map_err(|_| invalid())?,
        filled_collected: u64::try_from(collected).map_err(|_| invalid())?,
    })
}

fn validate_quantity(entry: &ProductCollectionEntry) -> Result<(), AppError> {
    if entry.product_name.trim().is_empty() {
        return Err(AppError::Validation(
            "product name cannot be empty".to_string(),
        ));
    }
    if !entry.quantity.is_finite() || entry.quantity < 0.0 {
        return Err(AppError::InvalidQuantity {
            product: entry.product_name.clone(),
            quantity: entry.quantity,
        });
    }
    Ok(())
}

/// Merges entries that name the same product (exact, case-sensitive match),
/// summing their quantities. Output keeps the order of first occurrence.
pub fn aggregate(entries: &[ProductCollectionEntry]) -> Result<Vec<ProductCollectionEntry>, AppError> {
    let mut totals: Vec<ProductCollectionEntry> = Vec::with_capacity(entries.len());
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(entries.len());

    for entry in entries {
        validate_quantity(entry)?;
        match slots.get(entry.product_name.as_str()) {
            Some(&slot) => totals[slot].quantity += entry.quantity,
            None => {
                slots.insert(entry.product_name.as_str(), totals.len());
                totals.push(entry.clone());
            }
        }
    }

    // Summing finite values can still overflow.
    if let Some(overflowed) = totals.iter().find(|entry| !entry.quantity.is_finite()) {
        return Err(AppError::InvalidQuantity {
            product: overflowed.product_name.clone(),
            quantity: overflowed.quantity,
        });
    }

    Ok(totals)
}

pub fn net_bin_delta(delivered: u64, collected: u64) -> i64 {
    let delivered = i64::try_from(delivered).unwrap_or(i64::MAX);
    let collected = i64::try_from(collected).unwrap_or(i64::MAX);
    delivered.saturating_sub(collected)
}

/// Empty bins expected on site: the location's starting stock plus the net
/// delta of every completed visit. Can go negative.
pub fn location_bin_balance<'a>(
    initial_empty_bins: u64,
    pickups: impl IntoIterator<Item = &'a Pickup>,
) -> i64 {
    pickups
        .into_iter()
        .filter(|pickup| pickup.status == PickupStatus::Completed)
        .map(|pickup| net_bin_delta(pickup.empty_bins_delivered, pickup.filled_bins_collected))
        .fold(
            i64::try_from(initial_empty_bins).unwrap_or(i64::MAX),
            i64::saturating_add,
        )
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::{aggregate, location_bin_balance, validate_bins, BinCounts};
    use crate::error::AppError;
    use crate::models::pickup::{
        InvoiceStatus, LocationSnapshot, Pickup, PickupStatus, ProductCollectionEntry,
    };

    fn entry(name: &str, quantity: f64) -> ProductCollectionEntry {
        ProductCollectionEntry::new(name, quantity)
    }

    fn visit(status: PickupStatus, delivered: u64, collected: u64) -> Pickup {
        let now = Utc::now();
        Pickup {
            id: Uuid::new_v4(),
            customer_id: Uuid::from_u128(1),
            driver_id: Uuid::from_u128(2),
            pickup_location: LocationSnapshot {
                name: "Back dock".to_string(),
                address: "9 Mill Rd".to_string(),
            },
            pickup_date: NaiveDate::from_ymd_opt(2026, 10, 20)
                .and_then(|d| d.and_hms_opt(7, 0, 0))
                .expect("valid date"),
            empty_bins_delivered: delivered,
            filled_bins_collected: collected,
            planned_products: Vec::new(),
            products_collected: Vec::new(),
            signature: None,
            status,
            invoice_status: InvoiceStatus::Unknown,
            invoice_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn merges_duplicates_in_first_seen_order() {
        let merged = aggregate(&[
            entry("OrganicWaste", 50.0),
            entry("OrganicWaste", 12.5),
            entry("GreenWaste", 30.0),
        ])
        .unwrap();

        assert_eq!(
            merged,
            vec![entry("OrganicWaste", 62.5), entry("GreenWaste", 30.0)]
        );
    }

    #[test]
    fn product_names_are_case_sensitive() {
        let merged = aggregate(&[entry("Glass", 1.0), entry("glass", 2.0)]).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn empty_input_aggregates_to_empty() {
        assert!(aggregate(&[]).unwrap().is_empty());
    }

    #[test]
    fn negative_and_non_finite_quantities_are_rejected() {
        for bad in [-0.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = aggregate(&[entry("Cardboard", 3.0), entry("Cardboard", bad)]);
            assert!(matches!(result, Err(AppError::InvalidQuantity { .. })));
        }
    }

    #[test]
    fn overflowing_sum_is_rejected() {
        let result = aggregate(&[entry("Metal", f64::MAX), entry("Metal", f64::MAX)]);
        assert!(matches!(result, Err(AppError::InvalidQuantity { .. })));
    }

    #[test]
    fn collected_may_exceed_delivered() {
        let bins = validate_bins(2, 8).unwrap();
        assert_eq!(
            bins,
            BinCounts {
                empty_delivered: 2,
                filled_collected: 8
            }
        );
        assert_eq!(bins.net_delta(), -6);
    }

    #[test]
    fn negative_bins_are_rejected() {
        assert!(matches!(
            validate_bins(-1, 0),
            Err(AppError::InvalidBinCount { .. })
        ));
        assert!(matches!(
            validate_bins(0, -3),
            Err(AppError::InvalidBinCount { .. })
        ));
    }

    #[test]
    fn bin_balance_only_counts_completed_visits() {
        let visits = [
            visit(PickupStatus::Completed, 10, 8),
            visit(PickupStatus::Completed, 0, 4),
            visit(PickupStatus::Scheduled, 50, 0),
            visit(PickupStatus::Cancelled, 5, 0),
        ];
        assert_eq!(location_bin_balance(3, &visits), 3 + 2 - 4);
    }
}
