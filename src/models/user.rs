//! Authenticated submitter derived from a verified identity token.
//!
//! Grounded on the original registry's `models/user.py`: the
//! `display_name` derivation and the BCEID special-case live here
//! because the behavior is cheap, self-contained, and directly useful
//! to anything that renders a submitter's name back to a caller.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
}

/// A user resolved from a verified bearer token's claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub login_source: String,
    pub sub: String,
    pub iss: String,
    /// Stable external identifier; unique across identity providers.
    pub unique_user_key: String,
}

impl User {
    /// Human-facing display name.
    ///
    /// IDIR usernames carry a `idir/` prefix and ` @idir` suffix that
    /// the UI never wants to see, so they're stripped. BCEID
    /// usernames aren't human-readable at all (they're opaque
    /// identifiers), so the raw username is hidden in that case —
    /// callers needing a BCEID display name must resolve it through
    /// the external auth service instead.
    pub fn display_name(&self) -> Option<String> {
        match self.login_source.to_ascii_lowercase().as_str() {
            "bceid" => None,
            _ => {
                let trimmed = self
                    .username
                    .strip_prefix("idir/")
                    .unwrap_or(&self.username);
                let trimmed = trimmed.strip_suffix(" @idir").unwrap_or(trimmed);
                Some(trimmed.to_string())
            }
        }
    }
}
