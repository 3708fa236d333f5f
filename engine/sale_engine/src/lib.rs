//! # Sale Engine
//!
//! Allocation and settlement core of the launchpad. One [`Sale`] accepts
//! contributions into a fixed-supply token sale within a time window,
//! enforces per-address and global caps, resolves allocations once the
//! window closes, and gates exactly-once claims and refunds.
//!
//! | Phase        | Entry Point(s)                                   |
//! |--------------|--------------------------------------------------|
//! | Setup        | [`SaleConfig::new`], [`Sale::new`], [`Sale::restore`] |
//! | Funding      | [`Sale::accept`], [`Sale::stage`] + [`Sale::commit`] |
//! | Resolution   | [`Sale::resolve`]                                |
//! | Settlement   | [`Sale::claim`], [`Sale::refund`]                |
//! | Queries      | `snapshot`, `resolution`, `claim_status`, `summary` |
//!
//! ## Architecture
//!
//! Window checks live in [`window`], admission rules in [`caps`], the
//! append-only record in [`ledger`], resolution math in [`allocation`] and
//! settlement state in [`claims`]. [`Sale`] only wires them together.

pub mod allocation;
pub mod caps;
pub mod claims;
mod errors;
pub mod ledger;
mod sale;
mod types;
pub mod window;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_allocation;
#[cfg(test)]
mod test_claims;

pub use caps::{AllowList, AlwaysVerified, KycOracle};
pub use errors::{Result, SaleError};
pub use sale::Sale;
pub use types::*;
