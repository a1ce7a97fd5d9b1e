//! Property-based tests for the reconciliation rules, the invoice status
//! mapping and driver scoping.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use pickup_ledger::engine::access::{can_see, scope_filter};
use pickup_ledger::engine::invoice_sync::map_external_status;
use pickup_ledger::engine::reconcile::{aggregate, location_bin_balance, validate_bins};
use pickup_ledger::models::access::{CallerContext, RoleName, DEFAULT_ROLE_TABLE};
use pickup_ledger::models::pickup::{
    InvoiceStatus, LocationSnapshot, Pickup, PickupFilter, PickupStatus, ProductCollectionEntry,
};
use pickup_ledger::store::accounting::{ExternalInvoice, ExternalInvoiceState};

const PRODUCTS: [&str; 4] = ["OrganicWaste", "GreenWaste", "organicwaste", "Cardboard"];

fn entry_strategy() -> impl Strategy<Value = ProductCollectionEntry> {
    (0usize..PRODUCTS.len(), 0u32..100_000)
        .prop_map(|(i, centi)| ProductCollectionEntry::new(PRODUCTS[i], f64::from(centi) / 100.0))
}

fn external_state_strategy() -> impl Strategy<Value = ExternalInvoiceState> {
    prop_oneof![
        Just(ExternalInvoiceState::Draft),
        Just(ExternalInvoiceState::Submitted),
        Just(ExternalInvoiceState::Authorised),
        Just(ExternalInvoiceState::Paid),
        Just(ExternalInvoiceState::Voided),
        Just(ExternalInvoiceState::Deleted),
    ]
}

fn status_strategy() -> impl Strategy<Value = PickupStatus> {
    prop_oneof![
        Just(PickupStatus::Scheduled),
        Just(PickupStatus::Completed),
        Just(PickupStatus::Cancelled),
    ]
}

fn pickup(driver: u128, status: PickupStatus, delivered: u64, collected: u64) -> Pickup {
    let now = Utc::now();
    Pickup {
        id: Uuid::new_v4(),
        customer_id: Uuid::from_u128(1),
        driver_id: Uuid::from_u128(driver),
        pickup_location: LocationSnapshot {
            name: "Kitchen".to_string(),
            address: "5 Quay St".to_string(),
        },
        pickup_date: NaiveDate::from_ymd_opt(2026, 10, 20)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
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

fn caller(role: RoleName, identity: u128) -> CallerContext {
    let permissions = DEFAULT_ROLE_TABLE
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, permissions)| *permissions)
        .expect("role is in the default table");
    CallerContext {
        identity: Uuid::from_u128(identity),
        role,
        permissions,
    }
}

proptest! {
    #[test]
    fn aggregate_preserves_total_quantity(entries in prop::collection::vec(entry_strategy(), 0..40)) {
        let merged = aggregate(&entries).unwrap();
        let before: f64 = entries.iter().map(|entry| entry.quantity).sum();
        let after: f64 = merged.iter().map(|entry| entry.quantity).sum();
        prop_assert!((before - after).abs() < 1e-6);
    }

    #[test]
    fn aggregate_yields_each_product_once(entries in prop::collection::vec(entry_strategy(), 0..40)) {
        let merged = aggregate(&entries).unwrap();
        let names: HashSet<&str> = merged.iter().map(|entry| entry.product_name.as_str()).collect();
        prop_assert_eq!(names.len(), merged.len());

        let distinct: HashSet<&str> = entries.iter().map(|entry| entry.product_name.as_str()).collect();
        prop_assert_eq!(distinct.len(), merged.len());
    }

    #[test]
    fn aggregate_keeps_first_occurrence_order(entries in prop::collection::vec(entry_strategy(), 0..40)) {
        let merged = aggregate(&entries).unwrap();
        let mut seen = Vec::new();
        for entry in &entries {
            if !seen.contains(&entry.product_name) {
                seen.push(entry.product_name.clone());
            }
        }
        let order: Vec<String> = merged.into_iter().map(|entry| entry.product_name).collect();
        prop_assert_eq!(order, seen);
    }

    #[test]
    fn aggregate_rejects_any_negative_quantity(
        mut entries in prop::collection::vec(entry_strategy(), 0..20),
        position in any::<prop::sample::Index>(),
        negative in -1000.0f64..-0.001,
    ) {
        let mut bad = ProductCollectionEntry::new("OrganicWaste", negative);
        if !entries.is_empty() {
            bad.product_name = entries[position.index(entries.len())].product_name.clone();
        }
        let at = position.index(entries.len() + 1);
        entries.insert(at, bad);
        prop_assert!(aggregate(&entries).is_err());
    }

    #[test]
    fn bin_validation_fails_exactly_on_negative_counts(delivered in -50i64..50, collected in -50i64..50) {
        let result = validate_bins(delivered, collected);
        prop_assert_eq!(result.is_err(), delivered < 0 || collected < 0);
        if let Ok(counts) = result {
            prop_assert_eq!(counts.net_delta(), delivered - collected);
        }
    }

    #[test]
    fn paid_maps_to_paid_whatever_the_due_date(offset_days in proptest::option::of(-400i64..400)) {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let invoice = ExternalInvoice {
            status: ExternalInvoiceState::Paid,
            due_date: offset_days.map(|days| now + Duration::days(days)),
        };
        prop_assert_eq!(map_external_status(&invoice, now), InvoiceStatus::Paid);
    }

    #[test]
    fn only_authorised_invoices_depend_on_the_due_date(
        status in external_state_strategy(),
        offset_days in -400i64..400,
    ) {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let dated = ExternalInvoice { status, due_date: Some(now + Duration::days(offset_days)) };
        let undated = ExternalInvoice { status, due_date: None };
        let mapped = map_external_status(&dated, now);

        if status == ExternalInvoiceState::Authorised {
            let expected = if offset_days < 0 { InvoiceStatus::Overdue } else { InvoiceStatus::Pending };
            prop_assert_eq!(mapped, expected);
        } else {
            prop_assert_eq!(mapped, map_external_status(&undated, now));
        }
        prop_assert_ne!(mapped, InvoiceStatus::Unknown);
    }

    #[test]
    fn driver_listing_never_leaks_other_drivers(
        assignments in prop::collection::vec((1u128..5, status_strategy()), 0..30),
        requested in proptest::option::of(1u128..5),
        me in 1u128..5,
    ) {
        let pickups: Vec<Pickup> = assignments
            .iter()
            .map(|(driver, status)| pickup(*driver, *status, 0, 0))
            .collect();
        let driver = caller(RoleName::Driver, me);
        let filter = scope_filter(&driver, PickupFilter {
            driver_id: requested.map(Uuid::from_u128),
            ..PickupFilter::default()
        });

        let visible: Vec<&Pickup> = pickups
            .iter()
            .filter(|pickup| filter.matches(pickup) && can_see(&driver, pickup))
            .collect();

        prop_assert!(visible.iter().all(|pickup| pickup.driver_id == driver.identity));
        if requested.is_none_or(|id| id == me) {
            let own = pickups.iter().filter(|pickup| pickup.driver_id == driver.identity).count();
            prop_assert_eq!(visible.len(), own);
        } else {
            prop_assert!(visible.is_empty());
        }
    }

    #[test]
    fn bin_balance_counts_completed_visits_only(
        initial in 0u64..100,
        visits in prop::collection::vec((status_strategy(), 0u64..20, 0u64..20), 0..20),
    ) {
        let pickups: Vec<Pickup> = visits
            .iter()
            .map(|(status, delivered, collected)| pickup(1, *status, *delivered, *collected))
            .collect();
        let expected = visits
            .iter()
            .filter(|(status, _, _)| *status == PickupStatus::Completed)
            .fold(initial as i64, |balance, (_, delivered, collected)| {
                balance + *delivered as i64 - *collected as i64
            });
        prop_assert_eq!(location_bin_balance(initial, &pickups), expected);
    }
}
