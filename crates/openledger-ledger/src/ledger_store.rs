//! Balance storage for the ledger plane.
//!
//! Balances are kept in one book per asset, each with a running supply
//! total, so supply and holder lookups never scan other assets. All
//! mutations are atomic: either the full operation succeeds or the balance
//! is unchanged.

use std::collections::HashMap;

use openledger_types::{Address, Amount, AssetId, AssetKind, LedgerError, Result};

/// Holders of one asset and their combined balance.
#[derive(Debug, Default)]
struct AssetBook {
    holders: HashMap<Address, Amount>,
    /// Always equal to the sum of `holders`.
    supply: Amount,
}

/// Authoritative balance table.
///
/// Only the [`crate::TransferEngine`] mutates it; everything else reads.
/// Zero balances and empty books are not stored.
#[derive(Debug, Default)]
pub struct LedgerStore {
    books: HashMap<AssetId, AssetBook>,
    /// Explicit kind tags. Missing entries are fungible.
    kinds: HashMap<AssetId, AssetKind>,
}

impl LedgerStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `owner` in `asset`. Unknown pairs are zero.
    #[must_use]
    pub fn balance_of(&self, asset: AssetId, owner: Address) -> Amount {
        self.books
            .get(&asset)
            .and_then(|book| book.holders.get(&owner))
            .copied()
            .unwrap_or(0)
    }

    /// Balances for paired `owners[i]` / `assets[i]`.
    ///
    /// # Errors
    /// Returns `ArityMismatch` if the slices differ in length.
    pub fn balance_of_batch(&self, owners: &[Address], assets: &[AssetId]) -> Result<Vec<Amount>> {
        if owners.len() != assets.len() {
            return Err(LedgerError::ArityMismatch {
                left: assets.len(),
                right: owners.len(),
            });
        }
        Ok(owners
            .iter()
            .zip(assets)
            .map(|(owner, asset)| self.balance_of(*asset, *owner))
            .collect())
    }

    /// Increase a balance.
    ///
    /// # Errors
    /// Returns `Overflow` if the balance or the asset's supply would exceed
    /// `u128::MAX`.
    pub fn credit(&mut self, asset: AssetId, owner: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let old = self.balance_of(asset, owner);
        let new = old.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.total_supply(asset)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.write(asset, owner, old, new);
        Ok(())
    }

    /// Decrease a balance.
    ///
    /// # Errors
    /// Returns `InsufficientBalance` if balance < amount.
    pub fn debit(&mut self, asset: AssetId, owner: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance_of(asset, owner);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset,
                needed: amount,
                available,
            });
        }
        self.write(asset, owner, available, available - amount);
        Ok(())
    }

    /// Take back a credit made by an operation that was rolled back.
    pub(crate) fn revert_credit(&mut self, asset: AssetId, owner: Address, amount: Amount) {
        let old = self.balance_of(asset, owner);
        self.write(asset, owner, old, old.saturating_sub(amount));
    }

    /// Give back a debit made by an operation that was rolled back.
    pub(crate) fn revert_debit(&mut self, asset: AssetId, owner: Address, amount: Amount) {
        let old = self.balance_of(asset, owner);
        self.write(asset, owner, old, old.saturating_add(amount));
    }

    /// Replace `owner`'s balance `old` with `new`, keeping the book's supply
    /// in step.
    fn write(&mut self, asset: AssetId, owner: Address, old: Amount, new: Amount) {
        if old == new {
            return;
        }
        let book = self.books.entry(asset).or_default();
        book.supply = if new > old {
            book.supply.saturating_add(new - old)
        } else {
            book.supply.saturating_sub(old - new)
        };
        if new == 0 {
            book.holders.remove(&owner);
        } else {
            book.holders.insert(owner, new);
        }
        if book.holders.is_empty() {
            self.books.remove(&asset);
        }
    }

    /// Whether `owner` could receive `amount` more of `asset` without overflow.
    #[must_use]
    pub fn can_credit(&self, asset: AssetId, owner: Address, amount: Amount) -> bool {
        self.balance_of(asset, owner).checked_add(amount).is_some()
    }

    /// Total supply of an asset, from the running total.
    #[must_use]
    pub fn total_supply(&self, asset: AssetId) -> Amount {
        self.books.get(&asset).map_or(0, |book| book.supply)
    }

    /// Sum of the asset's holder balances, recomputed from scratch.
    /// Saturates at `u128::MAX`.
    #[must_use]
    pub fn recount_supply(&self, asset: AssetId) -> Amount {
        self.books.get(&asset).map_or(0, |book| {
            book.holders
                .values()
                .fold(0, |sum: Amount, balance| sum.saturating_add(*balance))
        })
    }

    /// Number of distinct owners holding a non-zero balance of `asset`.
    #[must_use]
    pub fn holder_count(&self, asset: AssetId) -> usize {
        self.books.get(&asset).map_or(0, |book| book.holders.len())
    }

    /// The holder of a non-fungible asset, if it has been minted.
    /// Always `None` for fungible assets.
    #[must_use]
    pub fn owner_of(&self, asset: AssetId) -> Option<Address> {
        if self.kind_of(asset).is_fungible() {
            return None;
        }
        self.books
            .get(&asset)
            .and_then(|book| book.holders.keys().next())
            .copied()
    }

    /// Kind tag of an asset; unregistered assets are fungible.
    #[must_use]
    pub fn kind_of(&self, asset: AssetId) -> AssetKind {
        self.kinds.get(&asset).copied().unwrap_or_default()
    }

    /// Whether an explicit kind tag exists.
    #[must_use]
    pub fn is_registered(&self, asset: AssetId) -> bool {
        self.kinds.contains_key(&asset)
    }

    /// Tag an asset with its kind. Tags are set once, before any supply exists.
    ///
    /// # Errors
    /// Returns `InvalidAsset` if the asset is native, already tagged, or
    /// already has supply.
    pub fn register(&mut self, asset: AssetId, kind: AssetKind) -> Result<()> {
        let invalid = |reason: &str| LedgerError::InvalidAsset {
            asset,
            reason: reason.to_string(),
        };
        if asset.is_native() {
            return Err(invalid("native asset cannot be registered"));
        }
        if self.is_registered(asset) {
            return Err(invalid("already registered"));
        }
        if self.total_supply(asset) > 0 {
            return Err(invalid("asset already has supply"));
        }
        self.kinds.insert(asset, kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(n: u128) -> AssetId {
        AssetId::from_u128(n)
    }

    #[test]
    fn credit_increases_balance() {
        let mut store = LedgerStore::new();
        let user = Address::random();
        store.credit(asset(1), user, 1000).unwrap();
        assert_eq!(store.balance_of(asset(1), user), 1000);
        assert_eq!(store.balance_of(asset(2), user), 0);
    }

    #[test]
    fn debit_insufficient_fails_unchanged() {
        let mut store = LedgerStore::new();
        let user = Address::random();
        store.credit(asset(1), user, 100).unwrap();
        let err = store.debit(asset(1), user, 200).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                needed: 200,
                available: 100,
                ..
            }
        ));
        assert_eq!(store.balance_of(asset(1), user), 100);
    }

    #[test]
    fn debit_to_zero_removes_entry() {
        let mut store = LedgerStore::new();
        let user = Address::random();
        store.credit(asset(1), user, 10).unwrap();
        store.debit(asset(1), user, 10).unwrap();
        assert_eq!(store.balance_of(asset(1), user), 0);
        assert_eq!(store.holder_count(asset(1)), 0);
    }

    #[test]
    fn credit_overflow_rejected() {
        let mut store = LedgerStore::new();
        let user = Address::random();
        store.credit(asset(1), user, u128::MAX).unwrap();
        assert!(!store.can_credit(asset(1), user, 1));
        let err = store.credit(asset(1), user, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Overflow));
        assert_eq!(store.balance_of(asset(1), user), u128::MAX);
    }

    #[test]
    fn total_supply_sums_all_owners() {
        let mut store = LedgerStore::new();
        store.credit(asset(1), Address::random(), 1000).unwrap();
        store.credit(asset(1), Address::random(), 500).unwrap();
        store.credit(asset(2), Address::random(), 7).unwrap();
        assert_eq!(store.total_supply(asset(1)), 1500);
        assert_eq!(store.holder_count(asset(1)), 2);
    }

    #[test]
    fn running_supply_tracks_every_mutation() {
        let mut store = LedgerStore::new();
        let a = Address::random();
        let b = Address::random();
        store.credit(asset(1), a, 300).unwrap();
        store.credit(asset(1), b, 200).unwrap();
        store.debit(asset(1), a, 50).unwrap();
        store.revert_debit(asset(1), a, 50);
        store.revert_credit(asset(1), b, 200);
        assert!(store.debit(asset(1), b, 1).is_err());
        assert_eq!(store.total_supply(asset(1)), 300);
        assert_eq!(store.recount_supply(asset(1)), 300);
        assert_eq!(store.holder_count(asset(1)), 1);

        store.debit(asset(1), a, 300).unwrap();
        assert_eq!(store.total_supply(asset(1)), 0);
        assert_eq!(store.holder_count(asset(1)), 0);
    }

    #[test]
    fn supply_overflow_rejected_across_holders() {
        let mut store = LedgerStore::new();
        let a = Address::random();
        let b = Address::random();
        store.credit(asset(1), a, u128::MAX).unwrap();
        assert!(store.can_credit(asset(1), b, 1));
        let err = store.credit(asset(1), b, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Overflow));
        assert_eq!(store.balance_of(asset(1), b), 0);
        assert_eq!(store.total_supply(asset(1)), u128::MAX);
    }

    #[test]
    fn balance_of_batch_pairs_inputs() {
        let mut store = LedgerStore::new();
        let a = Address::random();
        let b = Address::random();
        store.credit(asset(1), a, 5).unwrap();
        store.credit(asset(2), b, 9).unwrap();
        let got = store
            .balance_of_batch(&[a, b, a], &[asset(1), asset(2), asset(2)])
            .unwrap();
        assert_eq!(got, vec![5, 9, 0]);

        let err = store.balance_of_batch(&[a], &[]).unwrap_err();
        assert!(matches!(err, LedgerError::ArityMismatch { .. }));
    }

    #[test]
    fn register_sets_kind_once() {
        let mut store = LedgerStore::new();
        assert_eq!(store.kind_of(asset(3)), AssetKind::Fungible);
        store.register(asset(3), AssetKind::NonFungible).unwrap();
        assert_eq!(store.kind_of(asset(3)), AssetKind::NonFungible);
        let err = store.register(asset(3), AssetKind::Fungible).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAsset { .. }));
    }

    #[test]
    fn register_rejects_existing_supply_and_native() {
        let mut store = LedgerStore::new();
        store.credit(asset(4), Address::random(), 1).unwrap();
        assert!(store.register(asset(4), AssetKind::NonFungible).is_err());
        assert!(store.register(AssetId::NATIVE, AssetKind::Fungible).is_err());
    }

    #[test]
    fn owner_of_only_for_non_fungible() {
        let mut store = LedgerStore::new();
        let holder = Address::random();
        store.register(asset(5), AssetKind::NonFungible).unwrap();
        assert_eq!(store.owner_of(asset(5)), None);
        store.credit(asset(5), holder, 1).unwrap();
        assert_eq!(store.owner_of(asset(5)), Some(holder));

        store.credit(asset(6), holder, 1).unwrap();
        assert_eq!(store.owner_of(asset(6)), None);
    }
}
