//! Quantity and asset-kind types.
//!
//! All quantities are non-negative integers. Arithmetic on them is always
//! checked; an overflow surfaces as [`crate::LedgerError::Overflow`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A non-negative integer quantity of one asset.
pub type Amount = u128;

/// Whether an asset class is fungible or non-fungible.
///
/// Kept as an explicit tag in the ledger's side table. Identifiers that were
/// never registered are treated as fungible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AssetKind {
    /// Interchangeable units; any holder may own any quantity.
    #[default]
    Fungible,
    /// A single indivisible item: total supply is at most one.
    NonFungible,
}

impl AssetKind {
    #[must_use]
    pub fn is_fungible(self) -> bool {
        self == Self::Fungible
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fungible => write!(f, "FUNGIBLE"),
            Self::NonFungible => write!(f, "NON_FUNGIBLE"),
        }
    }
}
