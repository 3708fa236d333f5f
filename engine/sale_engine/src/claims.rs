//! # Claim state machine
//!
//! Per-contributor settlement after resolution. Each contributor owns one
//! mutex-guarded entry, so a claim and a refund (or two duplicate claims)
//! for the same address race on a single check-and-set, while different
//! addresses never contend. The map of entries is built once from the
//! resolution and never changes shape afterwards.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};

use tracing::info;

use crate::errors::{Result, SaleError};
use crate::types::{
    AllocationRecord, ClaimPhase, ClaimStatus, ContributorId, Resolution, SettlementEvent,
    SettlementKind,
};

#[derive(Debug)]
struct ClaimEntry {
    record: AllocationRecord,
    claimed: bool,
    refunded: bool,
}

impl ClaimEntry {
    fn payable(&self, kind: SettlementKind) -> Result<u64> {
        if self.claimed {
            return Err(SaleError::AlreadyClaimed);
        }
        if self.refunded {
            return Err(SaleError::AlreadyRefunded);
        }
        let amount = match kind {
            SettlementKind::Claim => self.record.tokens_allocated,
            SettlementKind::Refund => self.record.refund_amount,
        };
        if amount == 0 {
            return Err(SaleError::NothingToClaim);
        }
        Ok(amount)
    }

    fn settle(&mut self, kind: SettlementKind) -> Result<SettlementEvent> {
        let amount = self.payable(kind)?;
        match kind {
            SettlementKind::Claim => self.claimed = true,
            SettlementKind::Refund => self.refunded = true,
        }
        Ok(SettlementEvent {
            contributor: self.record.contributor.clone(),
            kind,
            amount,
        })
    }

    fn status(&self) -> ClaimStatus {
        ClaimStatus {
            contributor: self.record.contributor.clone(),
            claimed: self.claimed,
            refunded: self.refunded,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClaimStateMachine {
    entries: OnceLock<HashMap<ContributorId, Mutex<ClaimEntry>>>,
}

impl ClaimStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move every contributor in `resolution` to `Resolved`.
    pub fn initialize(&self, resolution: &Resolution) -> Result<()> {
        let entries = resolution
            .records
            .iter()
            .map(|record| {
                let entry = ClaimEntry {
                    record: record.clone(),
                    claimed: false,
                    refunded: false,
                };
                (record.contributor.clone(), Mutex::new(entry))
            })
            .collect();
        self.entries
            .set(entries)
            .map_err(|_| SaleError::AlreadyResolved)
    }

    fn entry(&self, contributor: &ContributorId) -> Result<MutexGuard<'_, ClaimEntry>> {
        let entry = self
            .entries
            .get()
            .and_then(|entries| entries.get(contributor))
            .ok_or(SaleError::NotResolved)?;
        Ok(entry.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn claim(&self, contributor: &ContributorId) -> Result<SettlementEvent> {
        self.settle(contributor, SettlementKind::Claim)
    }

    pub fn refund(&self, contributor: &ContributorId) -> Result<SettlementEvent> {
        self.settle(contributor, SettlementKind::Refund)
    }

    pub fn settle(
        &self,
        contributor: &ContributorId,
        kind: SettlementKind,
    ) -> Result<SettlementEvent> {
        let event = self.entry(contributor)?.settle(kind)?;
        info!(
            contributor = %contributor,
            kind = kind.as_str(),
            amount = event.amount,
            "settlement recorded"
        );
        Ok(event)
    }

    /// Check whether `kind` would currently succeed, without changing state.
    pub fn check(&self, contributor: &ContributorId, kind: SettlementKind) -> Result<u64> {
        self.entry(contributor)?.payable(kind)
    }

    pub fn status(&self, contributor: &ContributorId) -> ClaimPhase {
        match self.entry(contributor) {
            Err(_) => ClaimPhase::Unresolved,
            Ok(entry) if entry.claimed => ClaimPhase::Claimed,
            Ok(entry) if entry.refunded => ClaimPhase::Refunded,
            Ok(_) => ClaimPhase::Resolved,
        }
    }

    pub fn claim_status(&self, contributor: &ContributorId) -> Option<ClaimStatus> {
        self.entry(contributor).ok().map(|entry| entry.status())
    }
}
