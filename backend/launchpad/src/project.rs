//! Descriptive project metadata shown on sale listing and detail pages.
//!
//! None of it affects allocation; it is stored next to the sale config and
//! returned with every sale summary.

use serde::{Deserialize, Serialize};

use crate::errors::{LaunchpadError, Result};

const MAX_SYMBOL_LEN: usize = 12;
const MAX_DESCRIPTION_LEN: usize = 4_000;
const MAX_HANDLE_LEN: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Ticker of the token on sale, upper-cased on validation.
    pub symbol: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitepaper: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub socials: Socials,
}

impl ProjectInfo {
    /// Check every field and normalise the symbol.
    pub fn validated(mut self) -> Result<Self> {
        if self.symbol.is_empty()
            || self.symbol.len() > MAX_SYMBOL_LEN
            || !self.symbol.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(LaunchpadError::BadRequest(format!(
                "symbol {:?} must be 1 to {MAX_SYMBOL_LEN} ASCII letters or digits",
                self.symbol
            )));
        }
        self.symbol.make_ascii_uppercase();

        if self.description.trim().is_empty() || self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(LaunchpadError::BadRequest(format!(
                "description must be 1 to {MAX_DESCRIPTION_LEN} bytes"
            )));
        }

        for (field, url) in [
            ("website", &self.website),
            ("whitepaper", &self.whitepaper),
            ("image_url", &self.image_url),
        ] {
            if let Some(url) = url {
                check_url(field, url)?;
            }
        }

        for (field, handle) in [
            ("twitter", &self.socials.twitter),
            ("telegram", &self.socials.telegram),
            ("discord", &self.socials.discord),
        ] {
            if let Some(handle) = handle {
                check_handle(field, handle)?;
            }
        }

        Ok(self)
    }
}

fn check_url(field: &str, url: &str) -> Result<()> {
    let valid = (url.starts_with("https://") || url.starts_with("http://"))
        && !url.chars().any(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(LaunchpadError::BadRequest(format!(
            "{field} must be an http(s) URL, got {url:?}"
        )))
    }
}

fn check_handle(field: &str, handle: &str) -> Result<()> {
    if handle.is_empty() || handle.len() > MAX_HANDLE_LEN || handle.chars().any(char::is_whitespace)
    {
        return Err(LaunchpadError::BadRequest(format!(
            "{field} handle {handle:?} is not valid"
        )));
    }
    Ok(())
}
