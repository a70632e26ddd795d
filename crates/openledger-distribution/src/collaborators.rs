//! External collaborators consulted by the claim path.
//!
//! The engine does not decide who may claim or how large a share is. Both
//! answers come from outside, through two narrow traits:
//!
//! - [`ClaimAuthorizer`]: identity / eligibility gate
//! - [`EntitlementSnapshot`]: proportional share at a snapshot date
//!
//! In-memory implementations are provided for tests and embedding.

use std::collections::{BTreeMap, HashMap, HashSet};

use openledger_types::{Address, Timestamp};
use rust_decimal::Decimal;

/// Decides whether a claimer may claim at all.
pub trait ClaimAuthorizer: Send + Sync {
    fn is_eligible(&self, claimer: Address) -> bool;
}

/// Reports a claimer's share of a period's allocation, as a fraction in
/// `[0, 1]`, evaluated at `snapshot_date`.
pub trait EntitlementSnapshot: Send + Sync {
    fn entitlement_of(&self, claimer: Address, snapshot_date: Timestamp) -> Decimal;
}

// ---------------------------------------------------------------------------
// Authorizers
// ---------------------------------------------------------------------------

/// Every claimer is eligible.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ClaimAuthorizer for AllowAll {
    fn is_eligible(&self, _claimer: Address) -> bool {
        true
    }
}

/// Only listed claimers are eligible.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: HashSet<Address>,
}

impl AllowList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, claimer: Address) -> Self {
        self.allowed.insert(claimer);
        self
    }

    pub fn allow(&mut self, claimer: Address) {
        self.allowed.insert(claimer);
    }

    pub fn revoke(&mut self, claimer: &Address) -> bool {
        self.allowed.remove(claimer)
    }
}

impl FromIterator<Address> for AllowList {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self {
            allowed: iter.into_iter().collect(),
        }
    }
}

impl ClaimAuthorizer for AllowList {
    fn is_eligible(&self, claimer: Address) -> bool {
        self.allowed.contains(&claimer)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Shares fixed in memory, optionally changing over time.
///
/// Each claimer has a history of `(effective_from, share)` entries; the share
/// reported for a snapshot date is the latest entry at or before it. A share
/// set with [`FixedEntitlements::set`] is effective from the beginning of
/// time. Unknown claimers are entitled to nothing.
#[derive(Debug, Clone, Default)]
pub struct FixedEntitlements {
    shares: HashMap<Address, BTreeMap<Timestamp, Decimal>>,
}

impl FixedEntitlements {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, claimer: Address, share: Decimal) -> Self {
        self.set(claimer, share);
        self
    }

    pub fn set(&mut self, claimer: Address, share: Decimal) {
        self.set_from(claimer, Timestamp::NONE, share);
    }

    /// Record a share that takes effect at `effective_from`.
    pub fn set_from(&mut self, claimer: Address, effective_from: Timestamp, share: Decimal) {
        self.shares
            .entry(claimer)
            .or_default()
            .insert(effective_from, share);
    }
}

impl EntitlementSnapshot for FixedEntitlements {
    fn entitlement_of(&self, claimer: Address, snapshot_date: Timestamp) -> Decimal {
        self.shares
            .get(&claimer)
            .and_then(|history| history.range(..=snapshot_date).next_back())
            .map_or(Decimal::ZERO, |(_, share)| *share)
    }
}
