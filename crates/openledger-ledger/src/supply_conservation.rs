//! Supply conservation invariant checker.
//!
//! Mathematical invariant enforced after every supply-changing operation:
//! ```text
//! ∀ asset: Σ balances == Σ minted − Σ burned
//! ```
//!
//! Transfers, claims and sweeps only move balances, so they never touch these
//! counters. Minting (including native disbursement funding) and burning are
//! the only entries.

use std::collections::{BTreeSet, HashMap};

use openledger_types::{Amount, AssetId, LedgerError, Result};

/// Tracks per-asset minted/burned totals.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    /// Total minted per asset since genesis.
    minted: HashMap<AssetId, Amount>,
    /// Total burned per asset since genesis.
    burned: HashMap<AssetId, Amount>,
}

impl SupplyConservation {
    /// Create a new supply conservation tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mint.
    ///
    /// # Errors
    /// Returns `Overflow` if the running total would exceed `u128::MAX`.
    pub fn record_mint(&mut self, asset: AssetId, amount: Amount) -> Result<()> {
        let total = self.minted.entry(asset).or_insert(0);
        *total = total.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Record a burn.
    ///
    /// # Errors
    /// Returns `Overflow` if the running total would exceed `u128::MAX`.
    pub fn record_burn(&mut self, asset: AssetId, amount: Amount) -> Result<()> {
        let total = self.burned.entry(asset).or_insert(0);
        *total = total.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Undo a mint recorded by an operation that was rolled back.
    pub(crate) fn revert_mint(&mut self, asset: AssetId, amount: Amount) {
        if let Some(total) = self.minted.get_mut(&asset) {
            *total = total.saturating_sub(amount);
        }
    }

    /// Undo a burn recorded by an operation that was rolled back.
    pub(crate) fn revert_burn(&mut self, asset: AssetId, amount: Amount) {
        if let Some(total) = self.burned.get_mut(&asset) {
            *total = total.saturating_sub(amount);
        }
    }

    /// Expected total supply for an asset: minted − burned.
    #[must_use]
    pub fn expected_supply(&self, asset: AssetId) -> Amount {
        self.total_minted(asset).saturating_sub(self.total_burned(asset))
    }

    /// Verify that the actual supply (sum of all balances) matches the
    /// expected supply for a given asset.
    ///
    /// # Errors
    /// Returns [`LedgerError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, asset: AssetId, actual_supply: Amount) -> Result<()> {
        let expected = self.expected_supply(asset);
        if actual_supply != expected {
            return Err(LedgerError::SupplyInvariantViolation {
                reason: format!(
                    "Asset {asset}: actual supply {actual_supply} != expected {expected} \
                     (minted={}, burned={})",
                    self.total_minted(asset),
                    self.total_burned(asset),
                ),
            });
        }
        Ok(())
    }

    /// Every asset that was ever minted or burned, in ID order.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<AssetId> {
        let assets: BTreeSet<AssetId> = self.minted.keys().chain(self.burned.keys()).copied().collect();
        assets.into_iter().collect()
    }

    #[must_use]
    pub fn total_minted(&self, asset: AssetId) -> Amount {
        self.minted.get(&asset).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_burned(&self, asset: AssetId) -> Amount {
        self.burned.get(&asset).copied().unwrap_or(0)
    }
}
