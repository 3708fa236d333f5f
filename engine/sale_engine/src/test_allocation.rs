use std::sync::Arc;
use std::thread;

use crate::allocation::allocate;
use crate::invariants::assert_all_resolution_invariants;
use crate::{
    AllocationRecord, AlwaysVerified, Contribution, ContributorId, MinimumPolicy,
    OversubscriptionReport, Sale, SaleConfig, SaleError, SaleParams, SalePhase,
};

fn params() -> SaleParams {
    SaleParams {
        start_time: 0,
        end_time: 100,
        token_price: 1,
        token_decimals: 0,
        hard_cap: 1_000,
        per_address_min: 1,
        per_address_max: 1_000,
        kyc_required: false,
        minimum_policy: MinimumPolicy::Advisory,
    }
}

fn setup_with(params: SaleParams) -> Sale {
    Sale::new(SaleConfig::new(params).unwrap(), Arc::new(AlwaysVerified))
}

fn addr(s: &str) -> ContributorId {
    ContributorId::new(s).unwrap()
}

fn contribution(who: &str, amount: u64, sequence: u64) -> Contribution {
    Contribution {
        contributor: addr(who),
        amount,
        timestamp: sequence,
        sequence,
        below_min_at_time_of_contribution: false,
    }
}

#[test]
fn test_undersubscribed_sale_fills_everyone() {
    let sale = setup_with(params());
    sale.accept(&addr("0xa"), 500, 10).unwrap();
    sale.accept(&addr("0xb"), 500, 20).unwrap();

    let resolution = sale.resolve(100).unwrap();
    assert_eq!(
        resolution.records,
        vec![
            AllocationRecord {
                contributor: addr("0xa"),
                contributed: 500,
                tokens_allocated: 500,
                refund_amount: 0,
            },
            AllocationRecord {
                contributor: addr("0xb"),
                contributed: 500,
                tokens_allocated: 500,
                refund_amount: 0,
            },
        ]
    );
    assert!(resolution.oversubscription.is_none());
    assert_all_resolution_invariants(sale.config(), &resolution);
}

#[test]
fn test_resolve_before_end_fails() {
    let sale = setup_with(params());
    sale.accept(&addr("0xa"), 500, 10).unwrap();
    assert_eq!(sale.resolve(99).unwrap_err(), SaleError::SaleStillOpen);
    assert!(sale.resolution().is_none());

    // The failed attempt must not have closed the ledger.
    assert!(sale.accept(&addr("0xb"), 10, 99).is_ok());
}

#[test]
fn test_resolve_is_one_shot() {
    let sale = setup_with(params());
    sale.accept(&addr("0xa"), 300, 10).unwrap();

    let first = sale.resolve(100).unwrap();
    assert_eq!(sale.resolve(150).unwrap_err(), SaleError::AlreadyResolved);

    let stored = sale.resolution().unwrap();
    assert_eq!(*stored, *first);
    assert_eq!(stored.resolved_at, 100);
    assert_eq!(sale.summary(150).phase, SalePhase::Resolved);
}

#[test]
fn test_staged_contribution_cannot_land_after_resolve() {
    let sale = setup_with(params());
    let staged = sale.stage(&addr("0xa"), 100, 99).unwrap();
    sale.resolve(100).unwrap();
    assert_eq!(sale.commit(staged).unwrap_err(), SaleError::SaleClosed);
    assert!(sale.resolution().unwrap().records.is_empty());
}

#[test]
fn test_records_follow_first_contribution_order() {
    let sale = setup_with(params());
    sale.accept(&addr("0xb"), 10, 1).unwrap();
    sale.accept(&addr("0xa"), 20, 2).unwrap();
    sale.accept(&addr("0xb"), 30, 3).unwrap();

    let resolution = sale.resolve(100).unwrap();
    let order: Vec<_> = resolution
        .records
        .iter()
        .map(|r| (r.contributor.as_str().to_string(), r.contributed))
        .collect();
    assert_eq!(
        order,
        vec![("0xb".to_string(), 40), ("0xa".to_string(), 20)]
    );
}

#[test]
fn test_oversubscribed_history_is_scaled_pro_rata() {
    // History acknowledged under a higher cap, now resolved against 1 000.
    let config = SaleConfig::new(params()).unwrap();
    let history = vec![contribution("0xa", 1_000, 0), contribution("0xb", 500, 1)];
    let sale = Sale::restore(config, Arc::new(AlwaysVerified), history, None, []).unwrap();

    let resolution = sale.resolve(100).unwrap();
    assert_eq!(resolution.records[0].tokens_allocated, 666);
    assert_eq!(resolution.records[0].refund_amount, 334);
    assert_eq!(resolution.records[1].tokens_allocated, 333);
    assert_eq!(resolution.records[1].refund_amount, 167);
    assert_eq!(
        resolution.oversubscription,
        Some(OversubscriptionReport {
            total_raised: 1_500,
            hard_cap: 1_000,
            unallocated_dust: 1,
        })
    );
    assert_all_resolution_invariants(sale.config(), &resolution);
}

#[test]
fn test_token_amounts_floor_at_price() {
    let sale = setup_with(SaleParams {
        token_price: 3,
        ..params()
    });
    sale.accept(&addr("0xa"), 10, 1).unwrap();

    let resolution = sale.resolve(100).unwrap();
    assert_eq!(resolution.records[0].tokens_allocated, 3);
    assert_eq!(resolution.records[0].refund_amount, 0);
    assert_all_resolution_invariants(sale.config(), &resolution);
}

#[test]
fn test_token_decimals_scale_allocation() {
    // 100 000 currency units per whole token of 6 decimals: 250 000 units
    // buy 2.5 tokens.
    let sale = setup_with(SaleParams {
        token_price: 100_000,
        token_decimals: 6,
        hard_cap: 1_000_000,
        per_address_max: 1_000_000,
        ..params()
    });
    sale.accept(&addr("0xa"), 250_000, 1).unwrap();

    let resolution = sale.resolve(100).unwrap();
    assert_eq!(resolution.records[0].tokens_allocated, 2_500_000);
    assert_all_resolution_invariants(sale.config(), &resolution);
}

#[test]
fn test_allocation_is_deterministic() {
    let config = SaleConfig::new(params()).unwrap();
    let sale = Sale::restore(
        config.clone(),
        Arc::new(AlwaysVerified),
        vec![
            contribution("0xa", 700, 0),
            contribution("0xb", 450, 1),
            contribution("0xc", 333, 2),
        ],
        None,
        [],
    )
    .unwrap();
    let snapshot = sale.snapshot();

    let first = allocate(&config, &snapshot, 100);
    let second = allocate(&config, &snapshot, 100);
    assert_eq!(first, second);
    assert_all_resolution_invariants(&config, &first);
}

#[test]
fn test_preview_matches_resolution() {
    let sale = setup_with(params());
    sale.accept(&addr("0xa"), 400, 1).unwrap();

    assert_eq!(
        sale.preview_resolution(50).unwrap_err(),
        SaleError::SaleStillOpen
    );
    let preview = sale.preview_resolution(120).unwrap();
    let resolution = sale.resolve(120).unwrap();
    assert_eq!(preview, *resolution);
    assert_eq!(
        sale.preview_resolution(130).unwrap_err(),
        SaleError::AlreadyResolved
    );
}

#[test]
fn test_summary_tracks_progress() {
    let sale = setup_with(params());
    assert_eq!(sale.summary(0).phase, SalePhase::Live);
    sale.accept(&addr("0xa"), 250, 1).unwrap();

    let summary = sale.summary(2);
    assert_eq!(summary.progress_bps, 2_500);
    assert_eq!(summary.contributors, 1);
    assert_eq!(sale.summary(100).phase, SalePhase::Ended);
}

#[test]
fn test_summary_totals_agree_under_concurrent_accepts() {
    // Every contributor puts in exactly 10, so a consistent summary always
    // reports total_raised == 10 * contributors.
    let sale = setup_with(params());
    thread::scope(|s| {
        for i in 0..50 {
            let sale = &sale;
            s.spawn(move || {
                sale.accept(&addr(&format!("0x{i:x}")), 10, 1).unwrap();
            });
        }
        for _ in 0..200 {
            let summary = sale.summary(1);
            assert_eq!(summary.total_raised, 10 * summary.contributors as u64);
        }
    });
    assert_eq!(sale.summary(1).contributors, 50);
}
