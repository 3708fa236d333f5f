//! Contributor address parsing.
//!
//! Addresses are 32-byte hex strings with a `0x` prefix. Short forms
//! (`0x2`) are left-padded and everything is lower-cased, so the same
//! account always maps to the same ledger key.

use sale_engine::ContributorId;

use crate::errors::{LaunchpadError, Result};

const ADDRESS_HEX_LEN: usize = 64;

pub fn parse_contributor(raw: &str) -> Result<ContributorId> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| LaunchpadError::BadRequest(format!("address {raw:?} must start with 0x")))?;

    if digits.is_empty() || digits.len() > ADDRESS_HEX_LEN {
        return Err(LaunchpadError::BadRequest(format!(
            "address {raw:?} must have 1 to {ADDRESS_HEX_LEN} hex digits"
        )));
    }

    let padded = format!("{:0>width$}", digits.to_ascii_lowercase(), width = ADDRESS_HEX_LEN);
    hex::decode(&padded)
        .map_err(|e| LaunchpadError::BadRequest(format!("address {raw:?} is not hex: {e}")))?;

    Ok(ContributorId::new(format!("0x{padded}"))?)
}
