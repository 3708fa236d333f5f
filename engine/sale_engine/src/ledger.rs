//! # Contribution ledger
//!
//! Append-only record of accepted contributions and the source of truth for
//! raised totals.
//!
//! All writes go through one mutex per ledger, so the read-validate-append
//! sequence is a single critical section and two contributions can never
//! both pass the hard-cap check against the same total. The snapshot lives
//! in an `Arc`: readers clone the pointer under the mutex, and an append
//! copies the snapshot only while an older one is still held by a reader.
//!
//! Hosts that must persist a contribution before acknowledging it use the
//! two-step [`ContributionLedger::stage`] / [`ContributionLedger::commit`]
//! pair from a single writer; [`ContributionLedger::accept`] does both in
//! one step for purely in-memory use.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::caps::{CapPolicy, KycOracle};
use crate::errors::{Result, SaleError};
use crate::types::{Contribution, ContributorId, LedgerSnapshot, Receipt, SaleConfig};
use crate::window;

#[derive(Debug, Default)]
struct LedgerState {
    snapshot: Arc<LedgerSnapshot>,
    sealed: bool,
}

impl LedgerState {
    fn stage(
        &self,
        config: &SaleConfig,
        kyc: &dyn KycOracle,
        contributor: &ContributorId,
        amount: u64,
        now: u64,
    ) -> Result<Contribution> {
        if amount == 0 {
            return Err(SaleError::InvalidAmount);
        }
        if self.sealed || !window::is_open(config, now) {
            return Err(SaleError::SaleClosed);
        }
        let check = CapPolicy::validate(config, &self.snapshot, contributor, amount, kyc)?;
        Ok(Contribution {
            contributor: contributor.clone(),
            amount,
            timestamp: now,
            sequence: self.snapshot.next_sequence(),
            below_min_at_time_of_contribution: check.below_minimum,
        })
    }

    fn append(&mut self, contribution: Contribution) -> Result<Receipt> {
        let expected = self.snapshot.next_sequence();
        if contribution.sequence != expected {
            return Err(SaleError::SequenceConflict {
                staged: contribution.sequence,
                expected,
            });
        }
        let snapshot = Arc::make_mut(&mut self.snapshot);
        let total_raised = snapshot
            .total_raised
            .checked_add(contribution.amount)
            .ok_or_else(|| SaleError::CorruptHistory("total raised overflows u64".to_string()))?;
        let per_contributor = snapshot
            .totals
            .get(&contribution.contributor)
            .copied()
            .unwrap_or(0)
            .checked_add(contribution.amount)
            .ok_or_else(|| {
                SaleError::CorruptHistory("contributor total overflows u64".to_string())
            })?;

        snapshot.total_raised = total_raised;
        snapshot
            .totals
            .insert(contribution.contributor.clone(), per_contributor);
        let receipt = Receipt::from(&contribution);
        snapshot.contributions.push(contribution);
        Ok(receipt)
    }
}

#[derive(Debug, Default)]
pub struct ContributionLedger {
    state: Mutex<LedgerState>,
}

impl ContributionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted history.
    ///
    /// History is trusted as acknowledged and is not re-validated against
    /// caps, but it must be gap-free from sequence 0 with positive amounts.
    pub fn restore(history: impl IntoIterator<Item = Contribution>) -> Result<Self> {
        let mut state = LedgerState::default();
        for contribution in history {
            if contribution.amount == 0 {
                return Err(SaleError::CorruptHistory(format!(
                    "contribution {} has a zero amount",
                    contribution.sequence
                )));
            }
            state.append(contribution).map_err(|e| match e {
                SaleError::SequenceConflict { staged, expected } => SaleError::CorruptHistory(
                    format!("expected sequence {expected}, found {staged}"),
                ),
                other => other,
            })?;
        }
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // Appends are the last step of every write, so a poisoned guard
        // still holds a consistent ledger.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate and append in one critical section.
    pub fn accept(
        &self,
        config: &SaleConfig,
        kyc: &dyn KycOracle,
        contributor: &ContributorId,
        amount: u64,
        now: u64,
    ) -> Result<Receipt> {
        let mut state = self.lock();
        let receipt = state
            .stage(config, kyc, contributor, amount, now)
            .and_then(|contribution| state.append(contribution));
        match &receipt {
            Ok(receipt) => debug!(
                contributor = %contributor,
                amount,
                sequence = receipt.sequence,
                "contribution accepted"
            ),
            Err(e) => debug!(
                contributor = %contributor,
                amount,
                reason = e.kind(),
                "contribution rejected"
            ),
        }
        receipt
    }

    /// Validate a contribution and return it with the sequence number it
    /// would receive, without appending it.
    pub fn stage(
        &self,
        config: &SaleConfig,
        kyc: &dyn KycOracle,
        contributor: &ContributorId,
        amount: u64,
        now: u64,
    ) -> Result<Contribution> {
        let staged = self.lock().stage(config, kyc, contributor, amount, now);
        if let Err(e) = &staged {
            debug!(
                contributor = %contributor,
                amount,
                reason = e.kind(),
                "contribution rejected"
            );
        }
        staged
    }

    /// Append a previously staged contribution.
    ///
    /// Fails with `SequenceConflict` if anything was appended since it was
    /// staged, and with `SaleClosed` once the ledger is sealed.
    pub fn commit(&self, contribution: Contribution) -> Result<Receipt> {
        let mut state = self.lock();
        if state.sealed {
            return Err(SaleError::SaleClosed);
        }
        state.append(contribution)
    }

    /// Current state; the lock is held only to clone the `Arc`.
    pub fn snapshot(&self) -> Arc<LedgerSnapshot> {
        Arc::clone(&self.lock().snapshot)
    }

    /// Close the ledger for good and return its final state.
    pub fn seal(&self) -> Arc<LedgerSnapshot> {
        let mut state = self.lock();
        state.sealed = true;
        Arc::clone(&state.snapshot)
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }
}
