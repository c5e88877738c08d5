//! Precondition policy for debugger patches.

use serde::{Deserialize, Serialize};

use crate::core::text::normalize_ws;

/// How to treat a patch whose `before` text no longer matches the file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchPolicy {
    /// Warn and write `after` anyway.
    #[default]
    Lenient,
    /// Warn and skip the entry.
    Strict,
}

/// Outcome of comparing a patch's expected content with the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// `before` was empty, so nothing was checked.
    Unchecked,
    Matches,
    Mismatch,
}

/// Compare `before` with `current` after whitespace normalization.
pub fn check_precondition(before: &str, current: &str) -> Precondition {
    if before.is_empty() {
        return Precondition::Unchecked;
    }
    if normalize_ws(before) == normalize_ws(current) {
        Precondition::Matches
    } else {
        Precondition::Mismatch
    }
}

impl PatchPolicy {
    /// Whether an entry with this precondition outcome should be written.
    pub fn allows(self, precondition: Precondition) -> bool {
        !matches!(
            (self, precondition),
            (PatchPolicy::Strict, Precondition::Mismatch)
        )
    }
}
