#![allow(dead_code)]

use crate::types::{LedgerSnapshot, Resolution, SaleConfig};

/// INV-1: total raised equals the sum of recorded amounts.
pub fn assert_total_matches_contributions(snapshot: &LedgerSnapshot) {
    let sum: u128 = snapshot
        .contributions
        .iter()
        .map(|c| c.amount as u128)
        .sum();
    assert_eq!(
        sum, snapshot.total_raised as u128,
        "INV-1 violated: contributions sum to {} but total_raised is {}",
        sum, snapshot.total_raised
    );
}

/// INV-2: sequence numbers start at 0 and have no gaps.
pub fn assert_sequences_gap_free(snapshot: &LedgerSnapshot) {
    for (i, contribution) in snapshot.contributions.iter().enumerate() {
        assert_eq!(
            contribution.sequence, i as u64,
            "INV-2 violated: expected sequence {}, got {}",
            i, contribution.sequence
        );
    }
}

/// INV-3: per-contributor totals agree with the contribution list.
pub fn assert_totals_consistent(snapshot: &LedgerSnapshot) {
    for (contributor, total) in &snapshot.totals {
        let sum: u64 = snapshot
            .contributions
            .iter()
            .filter(|c| &c.contributor == contributor)
            .map(|c| c.amount)
            .sum();
        assert_eq!(
            sum, *total,
            "INV-3 violated: {} has total {} but contributions sum to {}",
            contributor, total, sum
        );
    }
}

/// INV-4: per-contributor totals never decrease between two snapshots.
pub fn assert_totals_monotonic(before: &LedgerSnapshot, after: &LedgerSnapshot) {
    for (contributor, total) in &before.totals {
        let now = after.contributed_by(contributor);
        assert!(
            now >= *total,
            "INV-4 violated: {} went from {} to {}",
            contributor,
            total,
            now
        );
    }
}

/// INV-5: allocated tokens are worth no more than the hard cap, and the
/// filled amounts never exceed it.
pub fn assert_within_hard_cap(config: &SaleConfig, resolution: &Resolution) {
    let token_value: u128 = resolution
        .records
        .iter()
        .map(|r| config.value_of(r.tokens_allocated))
        .sum();
    assert!(
        token_value <= config.hard_cap() as u128,
        "INV-5 violated: tokens worth {} exceed hard cap {}",
        token_value,
        config.hard_cap()
    );

    let filled: u128 = resolution
        .records
        .iter()
        .map(|r| (r.contributed - r.refund_amount) as u128)
        .sum();
    assert!(
        filled <= config.hard_cap() as u128,
        "INV-5 violated: filled amount {} exceeds hard cap {}",
        filled,
        config.hard_cap()
    );
}

/// INV-6: every record refunds no more than was contributed.
pub fn assert_refunds_bounded(resolution: &Resolution) {
    for record in &resolution.records {
        assert!(
            record.refund_amount <= record.contributed,
            "INV-6 violated: {} refunded {} of {}",
            record.contributor,
            record.refund_amount,
            record.contributed
        );
    }
}

/// Run all snapshot invariants.
pub fn assert_all_ledger_invariants(snapshot: &LedgerSnapshot) {
    assert_total_matches_contributions(snapshot);
    assert_sequences_gap_free(snapshot);
    assert_totals_consistent(snapshot);
}

/// Run all resolution invariants.
pub fn assert_all_resolution_invariants(config: &SaleConfig, resolution: &Resolution) {
    assert_within_hard_cap(config, resolution);
    assert_refunds_bounded(resolution);
}
