//! # Cap policy
//!
//! Decides whether a contribution may be appended, given the ledger as it
//! stands. The checks run in a fixed order:
//!
//! 1. KYC gate (only when the sale requires it)
//! 2. per-address maximum on the cumulative amount
//! 3. global hard cap (no partial fills)
//! 4. per-address minimum, advisory or enforced per [`MinimumPolicy`]
//!
//! Validation has no side effects; the ledger performs the append.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::errors::{Result, SaleError};
use crate::types::{ContributorId, LedgerSnapshot, MinimumPolicy, SaleConfig};

/// External identity oracle consulted for KYC-gated sales.
pub trait KycOracle: Send + Sync {
    fn is_verified(&self, contributor: &ContributorId) -> bool;
}

/// Oracle for sales that never require KYC, or for tests that want every
/// address verified.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysVerified;

impl KycOracle for AlwaysVerified {
    fn is_verified(&self, _contributor: &ContributorId) -> bool {
        true
    }
}

/// In-memory set of verified addresses.
#[derive(Debug, Default)]
pub struct AllowList {
    verified: RwLock<HashSet<ContributorId>>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, contributor: ContributorId, verified: bool) {
        let mut set = self.verified.write().unwrap_or_else(|e| e.into_inner());
        if verified {
            set.insert(contributor);
        } else {
            set.remove(&contributor);
        }
    }
}

impl FromIterator<ContributorId> for AllowList {
    fn from_iter<T: IntoIterator<Item = ContributorId>>(iter: T) -> Self {
        Self {
            verified: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl KycOracle for AllowList {
    fn is_verified(&self, contributor: &ContributorId) -> bool {
        self.verified
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(contributor)
    }
}

/// Outcome of a passing validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapCheck {
    /// Contributor's total once this contribution is appended.
    pub cumulative: u64,
    pub below_minimum: bool,
}

pub struct CapPolicy;

impl CapPolicy {
    pub fn validate(
        config: &SaleConfig,
        snapshot: &LedgerSnapshot,
        contributor: &ContributorId,
        amount: u64,
        kyc: &dyn KycOracle,
    ) -> Result<CapCheck> {
        if config.kyc_required() && !kyc.is_verified(contributor) {
            return Err(SaleError::KycRequired);
        }

        let cumulative = snapshot
            .contributed_by(contributor)
            .checked_add(amount)
            .ok_or(SaleError::AboveMaximum {
                cumulative: u64::MAX,
                maximum: config.per_address_max(),
            })?;
        if cumulative > config.per_address_max() {
            return Err(SaleError::AboveMaximum {
                cumulative,
                maximum: config.per_address_max(),
            });
        }

        // u128 so a restored, already-oversubscribed total cannot wrap.
        if snapshot.total_raised as u128 + amount as u128 > config.hard_cap() as u128 {
            return Err(SaleError::HardCapExceeded {
                amount,
                total_raised: snapshot.total_raised,
                hard_cap: config.hard_cap(),
            });
        }

        let below_minimum = cumulative < config.per_address_min();
        if below_minimum && config.minimum_policy() == MinimumPolicy::Enforced {
            return Err(SaleError::BelowMinimum {
                cumulative,
                minimum: config.per_address_min(),
            });
        }

        Ok(CapCheck {
            cumulative,
            below_minimum,
        })
    }
}
