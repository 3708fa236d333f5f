//! Sale window checks.

use crate::types::{SaleConfig, SalePhase};

/// `true` iff `start_time <= now < end_time`.
pub fn is_open(config: &SaleConfig, now: u64) -> bool {
    config.start_time() <= now && now < config.end_time()
}

/// Reader-facing phase of a sale at `now`.
pub fn phase(config: &SaleConfig, now: u64, resolved: bool) -> SalePhase {
    if resolved {
        SalePhase::Resolved
    } else if now < config.start_time() {
        SalePhase::Upcoming
    } else if is_open(config, now) {
        SalePhase::Live
    } else {
        SalePhase::Ended
    }
}
