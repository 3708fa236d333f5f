//! One isolated sale instance.
//!
//! A [`Sale`] owns its configuration, ledger, resolver and claim book. There
//! is no shared global state, so any number of sales can run side by side in
//! one process.

use std::sync::Arc;

use crate::allocation::{self, AllocationResolver};
use crate::caps::KycOracle;
use crate::claims::ClaimStateMachine;
use crate::errors::{Result, SaleError};
use crate::ledger::ContributionLedger;
use crate::types::{
    ClaimPhase, ClaimStatus, Contribution, ContributorId, LedgerSnapshot, Receipt, Resolution,
    SaleConfig, SaleSummary, SettlementEvent, SettlementKind,
};
use crate::window;

const FULL_PROGRESS_BPS: u128 = 10_000;

pub struct Sale {
    config: SaleConfig,
    kyc: Arc<dyn KycOracle>,
    ledger: ContributionLedger,
    resolver: AllocationResolver,
    claims: ClaimStateMachine,
}

impl Sale {
    pub fn new(config: SaleConfig, kyc: Arc<dyn KycOracle>) -> Self {
        Self {
            config,
            kyc,
            ledger: ContributionLedger::new(),
            resolver: AllocationResolver::new(),
            claims: ClaimStateMachine::new(),
        }
    }

    /// Rebuild a sale from persisted contributions, resolution and
    /// settlements.
    ///
    /// A persisted resolution must match what the persisted contributions
    /// resolve to; anything else means the stores disagree.
    pub fn restore(
        config: SaleConfig,
        kyc: Arc<dyn KycOracle>,
        history: Vec<Contribution>,
        resolution: Option<Resolution>,
        settlements: impl IntoIterator<Item = (ContributorId, SettlementKind)>,
    ) -> Result<Self> {
        let sale = Self {
            config,
            kyc,
            ledger: ContributionLedger::restore(history)?,
            resolver: AllocationResolver::new(),
            claims: ClaimStateMachine::new(),
        };

        let Some(resolution) = resolution else {
            return Ok(sale);
        };

        let snapshot = sale.ledger.seal();
        let expected = allocation::allocate(&sale.config, &snapshot, resolution.resolved_at);
        if expected.records != resolution.records {
            return Err(SaleError::CorruptHistory(
                "stored allocations do not match stored contributions".to_string(),
            ));
        }
        sale.claims.initialize(&resolution)?;
        sale.resolver.restore(resolution)?;

        for (contributor, kind) in settlements {
            sale.claims.settle(&contributor, kind).map_err(|e| {
                SaleError::CorruptHistory(format!(
                    "replaying {} for {contributor}: {e}",
                    kind.as_str()
                ))
            })?;
        }
        Ok(sale)
    }

    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    pub fn accept(&self, contributor: &ContributorId, amount: u64, now: u64) -> Result<Receipt> {
        self.ledger
            .accept(&self.config, self.kyc.as_ref(), contributor, amount, now)
    }

    pub fn stage(
        &self,
        contributor: &ContributorId,
        amount: u64,
        now: u64,
    ) -> Result<Contribution> {
        self.ledger
            .stage(&self.config, self.kyc.as_ref(), contributor, amount, now)
    }

    pub fn commit(&self, contribution: Contribution) -> Result<Receipt> {
        self.ledger.commit(contribution)
    }

    pub fn snapshot(&self) -> Arc<LedgerSnapshot> {
        self.ledger.snapshot()
    }

    /// Resolve the sale. The claim book is ready before the resolution
    /// becomes visible through [`Sale::resolution`].
    pub fn resolve(&self, now: u64) -> Result<Arc<Resolution>> {
        self.resolver
            .resolve_then(&self.config, &self.ledger, now, |resolution| {
                self.claims.initialize(resolution)
            })
    }

    /// Compute the resolution `resolve(now)` would produce, without sealing
    /// the ledger or storing anything.
    pub fn preview_resolution(&self, now: u64) -> Result<Resolution> {
        if self.resolver.resolution().is_some() {
            return Err(SaleError::AlreadyResolved);
        }
        if now < self.config.end_time() {
            return Err(SaleError::SaleStillOpen);
        }
        Ok(allocation::allocate(&self.config, &self.ledger.snapshot(), now))
    }

    pub fn resolution(&self) -> Option<Arc<Resolution>> {
        self.resolver.resolution()
    }

    pub fn claim(&self, contributor: &ContributorId) -> Result<SettlementEvent> {
        self.claims.claim(contributor)
    }

    pub fn refund(&self, contributor: &ContributorId) -> Result<SettlementEvent> {
        self.claims.refund(contributor)
    }

    pub fn settle(
        &self,
        contributor: &ContributorId,
        kind: SettlementKind,
    ) -> Result<SettlementEvent> {
        self.claims.settle(contributor, kind)
    }

    /// Amount `kind` would pay out right now, or why it cannot.
    pub fn check_settlement(&self, contributor: &ContributorId, kind: SettlementKind) -> Result<u64> {
        self.claims.check(contributor, kind)
    }

    pub fn claim_status(&self, contributor: &ContributorId) -> Option<ClaimStatus> {
        self.claims.claim_status(contributor)
    }

    pub fn claim_phase(&self, contributor: &ContributorId) -> ClaimPhase {
        self.claims.status(contributor)
    }

    pub fn summary(&self, now: u64) -> SaleSummary {
        let snapshot = self.ledger.snapshot();
        let total_raised = snapshot.total_raised;
        let hard_cap = self.config.hard_cap();
        let progress_bps =
            (total_raised as u128 * FULL_PROGRESS_BPS / hard_cap as u128).min(FULL_PROGRESS_BPS);
        SaleSummary {
            phase: window::phase(&self.config, now, self.resolver.resolution().is_some()),
            total_raised,
            hard_cap,
            progress_bps: progress_bps as u32,
            contributors: snapshot.contributor_count(),
            start_time: self.config.start_time(),
            end_time: self.config.end_time(),
            token_price: self.config.token_price(),
            kyc_required: self.config.kyc_required(),
        }
    }
}
