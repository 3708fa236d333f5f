//! # Allocation resolver
//!
//! Turns the final ledger into one [`AllocationRecord`] per contributor,
//! exactly once per sale.
//!
//! Cap enforcement keeps `total_raised <= hard_cap`, so resolution normally
//! fills every contribution in full. A ledger restored under a lowered cap
//! can still exceed it; that case is scaled down pro-rata:
//!
//! ```text
//! eligible_i = floor(contributed_i * hard_cap / total_raised)
//! refund_i   = contributed_i - eligible_i
//! dust       = hard_cap - sum(eligible_i)      (left unallocated)
//! ```
//!
//! Contributors are visited in order of their first sequence number so the
//! output is reproducible from the same snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::errors::{Result, SaleError};
use crate::ledger::ContributionLedger;
use crate::types::{
    AllocationRecord, ContributorId, LedgerSnapshot, OversubscriptionReport, Resolution,
    SaleConfig,
};

/// Pure allocation over a snapshot.
pub fn allocate(config: &SaleConfig, snapshot: &LedgerSnapshot, resolved_at: u64) -> Resolution {
    let mut order: Vec<(ContributorId, u64)> = Vec::new();
    let mut index: HashMap<&ContributorId, usize> = HashMap::new();
    for contribution in &snapshot.contributions {
        match index.get(&contribution.contributor) {
            Some(&i) => order[i].1 += contribution.amount,
            None => {
                index.insert(&contribution.contributor, order.len());
                order.push((contribution.contributor.clone(), contribution.amount));
            }
        }
    }

    let total_raised = snapshot.total_raised;
    let hard_cap = config.hard_cap();
    let oversubscribed = total_raised > hard_cap;

    let mut eligible_sum: u64 = 0;
    let records: Vec<AllocationRecord> = order
        .into_iter()
        .map(|(contributor, contributed)| {
            let eligible = if oversubscribed {
                (contributed as u128 * hard_cap as u128 / total_raised as u128) as u64
            } else {
                contributed
            };
            eligible_sum += eligible;
            AllocationRecord {
                contributor,
                contributed,
                tokens_allocated: config.tokens_for(eligible),
                refund_amount: contributed - eligible,
            }
        })
        .collect();

    let oversubscription = oversubscribed.then(|| OversubscriptionReport {
        total_raised,
        hard_cap,
        unallocated_dust: hard_cap - eligible_sum,
    });

    Resolution {
        resolved_at,
        records,
        oversubscription,
    }
}

/// Holds the one resolution a sale may ever have.
#[derive(Debug, Default)]
pub struct AllocationResolver {
    resolution: Mutex<Option<Arc<Resolution>>>,
}

impl AllocationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Resolution>>> {
        self.resolution.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seal `ledger` and resolve it.
    ///
    /// Sealing takes the ledger's writer lock, so any accept that was in
    /// flight has either landed in the snapshot or will be rejected.
    pub fn resolve(
        &self,
        config: &SaleConfig,
        ledger: &ContributionLedger,
        now: u64,
    ) -> Result<Arc<Resolution>> {
        self.resolve_then(config, ledger, now, |_| Ok(()))
    }

    /// As [`resolve`](Self::resolve), running `prepare` on the resolution
    /// before it is published. If `prepare` fails nothing is published.
    pub fn resolve_then(
        &self,
        config: &SaleConfig,
        ledger: &ContributionLedger,
        now: u64,
        prepare: impl FnOnce(&Resolution) -> Result<()>,
    ) -> Result<Arc<Resolution>> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(SaleError::AlreadyResolved);
        }
        if now < config.end_time() {
            return Err(SaleError::SaleStillOpen);
        }

        let snapshot = ledger.seal();
        let resolution = Arc::new(allocate(config, &snapshot, now));

        if let Some(report) = resolution.oversubscription {
            warn!(
                total_raised = report.total_raised,
                hard_cap = report.hard_cap,
                unallocated_dust = report.unallocated_dust,
                "ledger exceeded hard cap at resolution; allocated pro-rata"
            );
        }
        info!(
            contributors = resolution.records.len(),
            total_raised = snapshot.total_raised,
            "sale resolved"
        );

        prepare(&resolution)?;
        *slot = Some(Arc::clone(&resolution));
        Ok(resolution)
    }

    /// Install a resolution loaded from storage.
    pub fn restore(&self, resolution: Resolution) -> Result<Arc<Resolution>> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(SaleError::AlreadyResolved);
        }
        let resolution = Arc::new(resolution);
        *slot = Some(Arc::clone(&resolution));
        Ok(resolution)
    }

    pub fn resolution(&self) -> Option<Arc<Resolution>> {
        self.lock().clone()
    }
}
