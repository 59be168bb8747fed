use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A batch-unique record key: the destination identifier value, case-folded.
///
/// Lower-casing is the only normalisation applied. Every map key in the
/// pipeline must come through [`IdentifierKey::normalize`]; two raw
/// identifiers differing only by case would otherwise be treated as distinct
/// records and could both attempt to create the same remote entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierKey(String);

impl IdentifierKey {
    pub fn normalize(raw: &str) -> Self {
        IdentifierKey(raw.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for IdentifierKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
