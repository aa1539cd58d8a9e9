//! Per-tier results of multi-tier writes and deletes.
//!
//! A write that lands in only some tiers is still a success from the cache's
//! point of view; these types let callers see exactly where it landed.

use std::fmt;

use crate::error::TierError;
use crate::tier::Tier;

/// Result of a write against one tier.
#[derive(Debug, Clone, Default)]
pub enum TierOutcome {
    /// The value was persisted in this tier.
    Written,
    /// The tier was disabled for this call.
    #[default]
    Skipped,
    /// The tier rejected the write.
    Failed(TierError),
}

impl TierOutcome {
    /// Returns `true` if the value was persisted.
    #[must_use]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }

    /// Returns `true` if the tier failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<Result<(), TierError>> for TierOutcome {
    fn from(result: Result<(), TierError>) -> Self {
        match result {
            Ok(()) => Self::Written,
            Err(e) => Self::Failed(e),
        }
    }
}

impl fmt::Display for TierOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written => write!(f, "written"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed(e) => write!(f, "failed ({e})"),
        }
    }
}

/// Outcome of `set` across all three tiers.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// Process-local tier.
    pub tier1: TierOutcome,
    /// Shared remote tier.
    pub tier2: TierOutcome,
    /// Durable tier.
    pub tier3: TierOutcome,
}

impl WriteOutcome {
    /// Returns the outcome for the given tier.
    #[must_use]
    pub fn get(&self, tier: Tier) -> &TierOutcome {
        match tier {
            Tier::Local => &self.tier1,
            Tier::Shared => &self.tier2,
            Tier::Durable => &self.tier3,
        }
    }

    /// Tiers that now hold the value.
    #[must_use]
    pub fn persisted(&self) -> Vec<Tier> {
        Tier::ALL
            .into_iter()
            .filter(|tier| self.get(*tier).is_written())
            .collect()
    }

    /// Returns `true` if at least one tier holds the value.
    #[must_use]
    pub fn any_written(&self) -> bool {
        !self.persisted().is_empty()
    }

    /// Number of tiers that failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        Tier::ALL
            .into_iter()
            .filter(|tier| self.get(*tier).is_failed())
            .count()
    }
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tier1={}, tier2={}, tier3={}",
            self.tier1, self.tier2, self.tier3
        )
    }
}

/// Result of a delete against one tier.
#[derive(Debug, Clone, Default)]
pub enum DeleteStatus {
    /// A live entry was removed.
    Removed,
    /// Nothing was stored under the key.
    Absent,
    /// The tier was disabled.
    #[default]
    Skipped,
    /// The tier failed.
    Failed(TierError),
}

impl From<Result<bool, TierError>> for DeleteStatus {
    fn from(result: Result<bool, TierError>) -> Self {
        match result {
            Ok(true) => Self::Removed,
            Ok(false) => Self::Absent,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Outcome of `delete` across all three tiers.
#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    /// Process-local tier.
    pub tier1: DeleteStatus,
    /// Shared remote tier.
    pub tier2: DeleteStatus,
    /// Durable tier.
    pub tier3: DeleteStatus,
}

impl DeleteOutcome {
    fn statuses(&self) -> [&DeleteStatus; 3] {
        [&self.tier1, &self.tier2, &self.tier3]
    }

    /// Returns `true` if any tier held a live entry.
    #[must_use]
    pub fn removed(&self) -> bool {
        self.statuses()
            .iter()
            .any(|s| matches!(s, DeleteStatus::Removed))
    }

    /// Number of tiers that failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.statuses()
            .iter()
            .filter(|s| matches!(s, DeleteStatus::Failed(_)))
            .count()
    }
}
