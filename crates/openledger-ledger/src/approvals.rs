//! Allowances and operator grants.
//!
//! Two independent ways to let someone else move an owner's balance:
//!
//! - **Allowance**: per (owner, spender, asset) quantity, drawn down by
//!   exactly the amount each authorized spend moves.
//! - **Operator**: blanket authority over every asset of an owner. An
//!   operator's spends never consult or touch allowances.
//!
//! ## Compare-and-swap approval
//!
//! Overwriting an allowance blindly lets a spender race the owner: spend the
//! old allowance, then the new one. [`ApprovalManager::approve`] therefore
//! only writes when the stored value equals the caller's `expected_current`.
//! Resetting to zero is always allowed.

use std::collections::{HashMap, HashSet};

use openledger_types::{Address, Amount, AssetId, LedgerError, Result};

/// Owns every allowance and operator grant.
#[derive(Debug, Default)]
pub struct ApprovalManager {
    /// (owner, spender, asset) → remaining allowance. Zero entries are not stored.
    allowances: HashMap<(Address, Address, AssetId), Amount>,
    /// (owner, operator) pairs with blanket authority.
    operators: HashSet<(Address, Address)>,
}

impl ApprovalManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allowance(&self, owner: Address, spender: Address, asset: AssetId) -> Amount {
        self.allowances
            .get(&(owner, spender, asset))
            .copied()
            .unwrap_or(0)
    }

    /// Set an allowance if the stored value still equals `expected_current`.
    /// Returns the previous value.
    ///
    /// # Errors
    /// Returns `AllowanceMismatch` if `new_value != 0` and the stored
    /// allowance differs from `expected_current`.
    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        asset: AssetId,
        expected_current: Amount,
        new_value: Amount,
    ) -> Result<Amount> {
        let actual = self.allowance(owner, spender, asset);
        if new_value != 0 && actual != expected_current {
            return Err(LedgerError::AllowanceMismatch {
                expected: expected_current,
                actual,
            });
        }
        self.store(owner, spender, asset, new_value);
        Ok(actual)
    }

    /// Grant or revoke operator status.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if `operator == owner`.
    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) -> Result<()> {
        if owner == operator {
            return Err(LedgerError::InvalidOperator(operator));
        }
        if approved {
            self.operators.insert((owner, operator));
        } else {
            self.operators.remove(&(owner, operator));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operators.contains(&(owner, operator))
    }

    /// Whether `spender` may move any of `owner`'s balances without touching
    /// an allowance (it is the owner or an operator).
    #[must_use]
    pub fn has_blanket_authority(&self, owner: Address, spender: Address) -> bool {
        owner == spender || self.is_approved_for_all(owner, spender)
    }

    /// Check an allowance covers `amount` without consuming it.
    ///
    /// # Errors
    /// Returns `InsufficientAllowance` if it doesn't.
    pub fn check(&self, owner: Address, spender: Address, asset: AssetId, amount: Amount) -> Result<()> {
        let available = self.allowance(owner, spender, asset);
        if available < amount {
            return Err(LedgerError::InsufficientAllowance {
                needed: amount,
                available,
            });
        }
        Ok(())
    }

    /// Draw `amount` from an allowance.
    ///
    /// # Errors
    /// Returns `InsufficientAllowance` if the allowance is too small; the
    /// allowance is then unchanged.
    pub fn consume(&mut self, owner: Address, spender: Address, asset: AssetId, amount: Amount) -> Result<()> {
        self.check(owner, spender, asset, amount)?;
        let remaining = self.allowance(owner, spender, asset) - amount;
        self.store(owner, spender, asset, remaining);
        Ok(())
    }

    /// Give back an allowance consumed by an operation that was rolled back.
    pub(crate) fn restore(&mut self, owner: Address, spender: Address, asset: AssetId, amount: Amount) {
        let current = self.allowance(owner, spender, asset);
        self.store(owner, spender, asset, current.saturating_add(amount));
    }

    /// Put an allowance back to an exact value after a failed approval.
    pub(crate) fn restore_exact(&mut self, owner: Address, spender: Address, asset: AssetId, value: Amount) {
        self.store(owner, spender, asset, value);
    }

    fn store(&mut self, owner: Address, spender: Address, asset: AssetId, value: Amount) {
        if value == 0 {
            self.allowances.remove(&(owner, spender, asset));
        } else {
            self.allowances.insert((owner, spender, asset), value);
        }
    }
}
