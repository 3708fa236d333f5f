//! # Types
//!
//! Shared data structures used across all modules of the sale engine.
//!
//! ## Design decisions
//!
//! ### Amounts
//!
//! Currency and token amounts are `u64` counts of the smallest indivisible
//! unit, matching native coin balances on the target network. Every product
//! that could leave `u64` range is computed in `u128`.
//!
//! ### Validated configuration
//!
//! [`SaleConfig`] can only be obtained through [`SaleConfig::new`] (or
//! deserialised through the same checks), so every other module may assume
//! `start_time < end_time` and `per_address_min <= per_address_max <= hard_cap`.
//!
//! ### Claim lifecycle
//!
//! [`ClaimPhase`] is forward-only per contributor:
//!
//! ```text
//! Unresolved ──► Resolved ──► Claimed
//!                    └──────► Refunded   (only when refund_amount > 0)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::SaleError;

/// Largest supported `token_decimals`; `10^18` still fits in `u64`.
pub const MAX_TOKEN_DECIMALS: u8 = 18;

/// Address of a participant in a sale.
///
/// Never empty and never contains whitespace; the address format itself is
/// left to the host.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContributorId(String);

impl ContributorId {
    pub fn new(address: impl Into<String>) -> Result<Self, SaleError> {
        let address = address.into();
        if address.is_empty() || address.chars().any(char::is_whitespace) {
            return Err(SaleError::InvalidContributor);
        }
        Ok(Self(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContributorId {
    type Error = SaleError;

    fn try_from(address: String) -> Result<Self, Self::Error> {
        Self::new(address)
    }
}

impl TryFrom<&str> for ContributorId {
    type Error = SaleError;

    fn try_from(address: &str) -> Result<Self, Self::Error> {
        Self::new(address)
    }
}

impl From<ContributorId> for String {
    fn from(id: ContributorId) -> Self {
        id.0
    }
}

/// How the per-address minimum is applied at contribution time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimumPolicy {
    /// Accept and flag contributions that leave the contributor below the
    /// minimum, so top-ups can still reach it later.
    #[default]
    Advisory,
    /// Reject any contribution that leaves the contributor below the minimum.
    Enforced,
}

/// Unvalidated sale parameters, as supplied by an operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleParams {
    pub start_time: u64,
    pub end_time: u64,
    /// Currency units per whole token (`10^token_decimals` token units).
    pub token_price: u64,
    #[serde(default)]
    pub token_decimals: u8,
    pub hard_cap: u64,
    pub per_address_min: u64,
    pub per_address_max: u64,
    #[serde(default)]
    pub kyc_required: bool,
    #[serde(default)]
    pub minimum_policy: MinimumPolicy,
}

/// Immutable, validated configuration of one sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SaleParams", into = "SaleParams")]
pub struct SaleConfig {
    params: SaleParams,
}

impl SaleConfig {
    pub fn new(params: SaleParams) -> Result<Self, SaleError> {
        if params.end_time <= params.start_time {
            return Err(SaleError::InvalidConfig("end_time must be after start_time"));
        }
        if params.token_price == 0 {
            return Err(SaleError::InvalidConfig("token_price must be positive"));
        }
        if params.hard_cap == 0 {
            return Err(SaleError::InvalidConfig("hard_cap must be positive"));
        }
        if params.per_address_max == 0 {
            return Err(SaleError::InvalidConfig("per_address_max must be positive"));
        }
        if params.per_address_min > params.per_address_max {
            return Err(SaleError::InvalidConfig(
                "per_address_min must not exceed per_address_max",
            ));
        }
        if params.per_address_max > params.hard_cap {
            return Err(SaleError::InvalidConfig(
                "per_address_max must not exceed hard_cap",
            ));
        }
        if params.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(SaleError::InvalidConfig("token_decimals must be at most 18"));
        }
        let full_allocation =
            params.hard_cap as u128 * 10u128.pow(params.token_decimals as u32)
                / params.token_price as u128;
        if full_allocation > u64::MAX as u128 {
            return Err(SaleError::InvalidConfig(
                "token allocation for the full hard cap does not fit in u64",
            ));
        }
        Ok(Self { params })
    }

    pub fn start_time(&self) -> u64 {
        self.params.start_time
    }

    pub fn end_time(&self) -> u64 {
        self.params.end_time
    }

    pub fn token_price(&self) -> u64 {
        self.params.token_price
    }

    pub fn token_decimals(&self) -> u8 {
        self.params.token_decimals
    }

    pub fn hard_cap(&self) -> u64 {
        self.params.hard_cap
    }

    pub fn per_address_min(&self) -> u64 {
        self.params.per_address_min
    }

    pub fn per_address_max(&self) -> u64 {
        self.params.per_address_max
    }

    pub fn kyc_required(&self) -> bool {
        self.params.kyc_required
    }

    pub fn minimum_policy(&self) -> MinimumPolicy {
        self.params.minimum_policy
    }

    pub fn params(&self) -> &SaleParams {
        &self.params
    }

    /// Token units bought by `amount` currency units, floored.
    ///
    /// Callers only pass amounts bounded by `hard_cap`, which construction
    /// guarantees converts into `u64` range.
    pub fn tokens_for(&self, amount: u64) -> u64 {
        let scale = 10u128.pow(self.params.token_decimals as u32);
        let tokens = amount as u128 * scale / self.params.token_price as u128;
        tokens.min(u64::MAX as u128) as u64
    }

    /// Currency value of `tokens` token units, in `u128` so sums never wrap.
    pub fn value_of(&self, tokens: u64) -> u128 {
        let scale = 10u128.pow(self.params.token_decimals as u32);
        tokens as u128 * self.params.token_price as u128 / scale
    }
}

impl TryFrom<SaleParams> for SaleConfig {
    type Error = SaleError;

    fn try_from(params: SaleParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<SaleConfig> for SaleParams {
    fn from(config: SaleConfig) -> Self {
        config.params
    }
}

/// One accepted contribution. Never mutated after it is recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub contributor: ContributorId,
    pub amount: u64,
    pub timestamp: u64,
    /// Gap-free, starting at 0, assigned by the ledger.
    pub sequence: u64,
    pub below_min_at_time_of_contribution: bool,
}

/// Acknowledgement returned to the caller of a successful accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub sequence: u64,
    pub below_min_at_time_of_contribution: bool,
}

impl From<&Contribution> for Receipt {
    fn from(contribution: &Contribution) -> Self {
        Self {
            sequence: contribution.sequence,
            below_min_at_time_of_contribution: contribution.below_min_at_time_of_contribution,
        }
    }
}

/// Point-in-time, read-only view of a ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total_raised: u64,
    /// Ordered by ascending sequence number.
    pub contributions: Vec<Contribution>,
    /// Cumulative amount per contributor.
    pub totals: BTreeMap<ContributorId, u64>,
}

impl LedgerSnapshot {
    pub fn contributed_by(&self, contributor: &ContributorId) -> u64 {
        self.totals.get(contributor).copied().unwrap_or(0)
    }

    pub fn contributor_count(&self) -> usize {
        self.totals.len()
    }

    /// Sequence number the next appended contribution will receive.
    pub fn next_sequence(&self) -> u64 {
        self.contributions.len() as u64
    }
}

/// Final outcome for one contributor, fixed at resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub contributor: ContributorId,
    pub contributed: u64,
    pub tokens_allocated: u64,
    pub refund_amount: u64,
}

/// Diagnostic attached to a resolution whose ledger exceeded the hard cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OversubscriptionReport {
    pub total_raised: u64,
    pub hard_cap: u64,
    /// `hard_cap` minus the sum of eligible amounts, left unallocated.
    pub unallocated_dust: u64,
}

/// Output of resolving a sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_at: u64,
    /// Ordered by each contributor's first sequence number.
    pub records: Vec<AllocationRecord>,
    pub oversubscription: Option<OversubscriptionReport>,
}

impl Resolution {
    pub fn record_for(&self, contributor: &ContributorId) -> Option<&AllocationRecord> {
        self.records.iter().find(|r| &r.contributor == contributor)
    }

    pub fn total_tokens(&self) -> u128 {
        self.records.iter().map(|r| r.tokens_allocated as u128).sum()
    }

    pub fn total_refunds(&self) -> u128 {
        self.records.iter().map(|r| r.refund_amount as u128).sum()
    }
}

/// Settlement flags for one contributor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimStatus {
    pub contributor: ContributorId,
    pub claimed: bool,
    pub refunded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPhase {
    Unresolved,
    Resolved,
    Claimed,
    Refunded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Claim,
    Refund,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Refund => "refund",
        }
    }
}

/// Emitted by a successful claim or refund. The actual transfer happens
/// outside the engine, keyed by contributor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub contributor: ContributorId,
    pub kind: SettlementKind,
    /// Token units for a claim, currency units for a refund.
    pub amount: u64,
}

/// Lifecycle of a sale as seen by readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalePhase {
    Upcoming,
    Live,
    Ended,
    Resolved,
}

/// Authoritative read projection for listing and detail pages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSummary {
    pub phase: SalePhase,
    pub total_raised: u64,
    pub hard_cap: u64,
    /// Progress towards the hard cap in basis points, capped at 10 000.
    pub progress_bps: u32,
    pub contributors: usize,
    pub start_time: u64,
    pub end_time: u64,
    pub token_price: u64,
    pub kyc_required: bool,
}
