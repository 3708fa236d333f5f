//! Audit events recorded for every state change of a sale.

use sale_engine::{SettlementEvent, SettlementKind};
use serde::{Deserialize, Serialize};

/// All event kinds the service records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A sale was registered with a validated config.
    SaleCreated,
    /// A contribution was persisted and acknowledged.
    ContributionAccepted,
    /// The sale was resolved and allocations fixed.
    SaleResolved,
    /// Resolution found the ledger above the hard cap.
    OversubscriptionDetected,
    /// A contributor claimed their tokens.
    TokensClaimed,
    /// A contributor took their refund.
    ContributionRefunded,
}

impl EventKind {
    /// Return a short identifier string suitable for storage in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaleCreated => "sale_created",
            Self::ContributionAccepted => "contribution_accepted",
            Self::SaleResolved => "sale_resolved",
            Self::OversubscriptionDetected => "oversubscription_detected",
            Self::TokensClaimed => "tokens_claimed",
            Self::ContributionRefunded => "contribution_refunded",
        }
    }

    pub fn for_settlement(kind: SettlementKind) -> Self {
        match kind {
            SettlementKind::Claim => Self::TokensClaimed,
            SettlementKind::Refund => Self::ContributionRefunded,
        }
    }
}

/// An event ready to be stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleEvent {
    pub sale_id: i64,
    pub event_type: String,
    pub contributor: Option<String>,
    pub amount: Option<String>,
    pub sequence: Option<i64>,
    pub detail: Option<String>,
    pub timestamp: i64,
}

impl SaleEvent {
    pub fn new(sale_id: i64, kind: EventKind, timestamp: i64) -> Self {
        Self {
            sale_id,
            event_type: kind.as_str().to_string(),
            contributor: None,
            amount: None,
            sequence: None,
            detail: None,
            timestamp,
        }
    }

    pub fn settlement(sale_id: i64, event: &SettlementEvent, timestamp: i64) -> Self {
        Self {
            contributor: Some(event.contributor.to_string()),
            amount: Some(event.amount.to_string()),
            ..Self::new(sale_id, EventKind::for_settlement(event.kind), timestamp)
        }
    }

    pub fn with_contributor(mut self, contributor: impl ToString) -> Self {
        self.contributor = Some(contributor.to_string());
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount.to_string());
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence as i64);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

/// An event record as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub sale_id: i64,
    pub event_type: String,
    pub contributor: Option<String>,
    pub amount: Option<String>,
    pub sequence: Option<i64>,
    pub detail: Option<String>,
    pub timestamp: i64,
    pub created_at: i64,
}
