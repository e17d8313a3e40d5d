//! Player roles and display names.

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};

/// Cosmetic player role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular crew member.
    #[default]
    Crew,
    /// The killer.
    Killer,
}

/// Trim a raw display name, rejecting names that are empty after trimming.
pub fn display_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CoreError::EmptyDisplayName);
    }
    Ok(name.to_owned())
}
