use std::sync::Arc;
use std::thread;

use crate::{
    AlwaysVerified, ClaimPhase, ClaimStatus, Contribution, ContributorId, MinimumPolicy, Sale,
    SaleConfig, SaleError, SaleParams, SettlementKind,
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

fn addr(s: &str) -> ContributorId {
    ContributorId::new(s).unwrap()
}

/// A=500, B=500, resolved at the end of the window.
fn setup_resolved() -> Sale {
    let sale = Sale::new(SaleConfig::new(params()).unwrap(), Arc::new(AlwaysVerified));
    sale.accept(&addr("0xa"), 500, 10).unwrap();
    sale.accept(&addr("0xb"), 500, 20).unwrap();
    sale.resolve(100).unwrap();
    sale
}

/// Oversubscribed history (A=1000, B=500 against a 1000 cap) so both
/// contributors have tokens and a refund.
fn setup_oversubscribed() -> Sale {
    let history = vec![
        Contribution {
            contributor: addr("0xa"),
            amount: 1_000,
            timestamp: 1,
            sequence: 0,
            below_min_at_time_of_contribution: false,
        },
        Contribution {
            contributor: addr("0xb"),
            amount: 500,
            timestamp: 2,
            sequence: 1,
            below_min_at_time_of_contribution: false,
        },
    ];
    let sale = Sale::restore(
        SaleConfig::new(params()).unwrap(),
        Arc::new(AlwaysVerified),
        history,
        None,
        [],
    )
    .unwrap();
    sale.resolve(100).unwrap();
    sale
}

#[test]
fn test_claim_succeeds_once() {
    let sale = setup_resolved();
    let event = sale.claim(&addr("0xa")).unwrap();
    assert_eq!(event.kind, SettlementKind::Claim);
    assert_eq!(event.amount, 500);

    assert_eq!(sale.claim(&addr("0xa")).unwrap_err(), SaleError::AlreadyClaimed);
    assert_eq!(sale.claim_phase(&addr("0xa")), ClaimPhase::Claimed);
    assert_eq!(
        sale.claim_status(&addr("0xa")),
        Some(ClaimStatus {
            contributor: addr("0xa"),
            claimed: true,
            refunded: false,
        })
    );
}

#[test]
fn test_claim_before_resolution_fails() {
    let sale = Sale::new(SaleConfig::new(params()).unwrap(), Arc::new(AlwaysVerified));
    sale.accept(&addr("0xa"), 500, 10).unwrap();

    assert_eq!(sale.claim(&addr("0xa")).unwrap_err(), SaleError::NotResolved);
    assert_eq!(sale.refund(&addr("0xa")).unwrap_err(), SaleError::NotResolved);
    assert_eq!(sale.claim_phase(&addr("0xa")), ClaimPhase::Unresolved);
    assert!(sale.claim_status(&addr("0xa")).is_none());
}

#[test]
fn test_unknown_contributor_is_not_resolved() {
    let sale = setup_resolved();
    assert_eq!(sale.claim(&addr("0xz")).unwrap_err(), SaleError::NotResolved);
}

#[test]
fn test_refund_without_refund_amount_fails() {
    let sale = setup_resolved();
    assert_eq!(sale.refund(&addr("0xb")).unwrap_err(), SaleError::NothingToClaim);
    assert_eq!(sale.claim_phase(&addr("0xb")), ClaimPhase::Resolved);
}

#[test]
fn test_nothing_to_claim_without_tokens() {
    let sale = Sale::new(
        SaleConfig::new(SaleParams {
            token_price: 10,
            ..params()
        })
        .unwrap(),
        Arc::new(AlwaysVerified),
    );
    sale.accept(&addr("0xa"), 9, 10).unwrap();
    sale.resolve(100).unwrap();

    assert_eq!(sale.claim(&addr("0xa")).unwrap_err(), SaleError::NothingToClaim);
}

#[test]
fn test_claim_and_refund_are_exclusive() {
    let sale = setup_oversubscribed();

    let refund = sale.refund(&addr("0xa")).unwrap();
    assert_eq!(refund.amount, 334);
    assert_eq!(sale.claim(&addr("0xa")).unwrap_err(), SaleError::AlreadyRefunded);
    assert_eq!(sale.claim_phase(&addr("0xa")), ClaimPhase::Refunded);

    let claim = sale.claim(&addr("0xb")).unwrap();
    assert_eq!(claim.amount, 333);
    assert_eq!(sale.refund(&addr("0xb")).unwrap_err(), SaleError::AlreadyClaimed);
}

#[test]
fn test_check_does_not_transition() {
    let sale = setup_resolved();
    assert_eq!(
        sale.check_settlement(&addr("0xa"), SettlementKind::Claim),
        Ok(500)
    );
    assert_eq!(sale.claim_phase(&addr("0xa")), ClaimPhase::Resolved);
}

#[test]
fn test_concurrent_duplicate_claims_settle_once() {
    let sale = Arc::new(setup_resolved());
    let successes = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sale = Arc::clone(&sale);
                s.spawn(move || sale.claim(&addr("0xa")).is_ok())
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });
    assert_eq!(successes, 1);
}

#[test]
fn test_concurrent_claim_and_refund_race() {
    let sale = Arc::new(setup_oversubscribed());
    let (claimed, refunded) = thread::scope(|s| {
        let claim = {
            let sale = Arc::clone(&sale);
            s.spawn(move || sale.claim(&addr("0xa")).is_ok())
        };
        let refund = {
            let sale = Arc::clone(&sale);
            s.spawn(move || sale.refund(&addr("0xa")).is_ok())
        };
        (claim.join().unwrap(), refund.join().unwrap())
    });
    assert!(claimed ^ refunded);
}

#[test]
fn test_published_resolution_is_always_claimable() {
    for _ in 0..50 {
        let sale = Sale::new(SaleConfig::new(params()).unwrap(), Arc::new(AlwaysVerified));
        sale.accept(&addr("0xa"), 500, 10).unwrap();

        let outcome = thread::scope(|s| {
            let claimer = s.spawn(|| loop {
                if sale.resolution().is_some() {
                    return sale.claim(&addr("0xa"));
                }
                thread::yield_now();
            });
            sale.resolve(100).unwrap();
            claimer.join().unwrap()
        });

        assert_eq!(outcome.unwrap().amount, 500);
    }
}

#[test]
fn test_restore_replays_settlements() {
    let original = setup_resolved();
    original.claim(&addr("0xa")).unwrap();
    let resolution = (*original.resolution().unwrap()).clone();

    let restored = Sale::restore(
        SaleConfig::new(params()).unwrap(),
        Arc::new(AlwaysVerified),
        original.snapshot().contributions.clone(),
        Some(resolution),
        [(addr("0xa"), SettlementKind::Claim)],
    )
    .unwrap();

    assert_eq!(restored.claim(&addr("0xa")).unwrap_err(), SaleError::AlreadyClaimed);
    assert!(restored.claim(&addr("0xb")).is_ok());
    assert_eq!(restored.resolve(200).unwrap_err(), SaleError::AlreadyResolved);
    assert_eq!(
        restored.accept(&addr("0xc"), 1, 50).unwrap_err(),
        SaleError::SaleClosed
    );
}

#[test]
fn test_restore_rejects_mismatched_resolution() {
    let original = setup_resolved();
    let mut resolution = (*original.resolution().unwrap()).clone();
    resolution.records[0].tokens_allocated += 1;

    let err = Sale::restore(
        SaleConfig::new(params()).unwrap(),
        Arc::new(AlwaysVerified),
        original.snapshot().contributions.clone(),
        Some(resolution),
        [],
    )
    .err()
    .unwrap();
    assert!(matches!(err, SaleError::CorruptHistory(_)));
}
