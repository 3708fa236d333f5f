//! Error kinds surfaced by the sale engine.
//!
//! Every variant is a recoverable, caller-visible outcome. The engine never
//! retries on its own; the host decides what to do with each rejection.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaleError {
    #[error("invalid sale configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("contribution amount must be positive")]
    InvalidAmount,

    #[error("contributor address must be non-empty and free of whitespace")]
    InvalidContributor,

    #[error("sale is not accepting contributions")]
    SaleClosed,

    #[error("cumulative contribution {cumulative} is below the per-address minimum {minimum}")]
    BelowMinimum { cumulative: u64, minimum: u64 },

    #[error("cumulative contribution {cumulative} exceeds the per-address maximum {maximum}")]
    AboveMaximum { cumulative: u64, maximum: u64 },

    #[error("contribution of {amount} would exceed the hard cap ({total_raised} of {hard_cap} raised)")]
    HardCapExceeded {
        amount: u64,
        total_raised: u64,
        hard_cap: u64,
    },

    #[error("contributor has not passed KYC verification")]
    KycRequired,

    #[error("sale window has not closed yet")]
    SaleStillOpen,

    #[error("sale has already been resolved")]
    AlreadyResolved,

    #[error("no allocation exists for this contributor")]
    NotResolved,

    #[error("allocation already claimed")]
    AlreadyClaimed,

    #[error("contribution already refunded")]
    AlreadyRefunded,

    #[error("nothing to claim")]
    NothingToClaim,

    #[error("staged sequence {staged} is stale; next sequence is {expected}")]
    SequenceConflict { staged: u64, expected: u64 },

    #[error("persisted history is inconsistent: {0}")]
    CorruptHistory(String),
}

impl SaleError {
    /// Stable machine-readable identifier, used by hosts in error payloads
    /// and event logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidContributor => "invalid_contributor",
            Self::SaleClosed => "sale_closed",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::AboveMaximum { .. } => "above_maximum",
            Self::HardCapExceeded { .. } => "hard_cap_exceeded",
            Self::KycRequired => "kyc_required",
            Self::SaleStillOpen => "sale_still_open",
            Self::AlreadyResolved => "already_resolved",
            Self::NotResolved => "not_resolved",
            Self::AlreadyClaimed => "already_claimed",
            Self::AlreadyRefunded => "already_refunded",
            Self::NothingToClaim => "nothing_to_claim",
            Self::SequenceConflict { .. } => "sequence_conflict",
            Self::CorruptHistory(_) => "corrupt_history",
        }
    }
}

pub type Result<T> = std::result::Result<T, SaleError>;
