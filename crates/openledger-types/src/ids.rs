//! Identifiers used throughout OpenLedger.
//!
//! Addresses and asset identifiers are fixed-width byte strings rendered as
//! `0x`-prefixed hex. Distribution periods use a monotonically increasing
//! counter so every replica assigns the same ID to the same declaration.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::LedgerError;

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], LedgerError> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw)
        .map_err(|e| LedgerError::Serialization(format!("invalid hex '{s}': {e}")))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        LedgerError::Serialization(format!("expected {N} bytes, got {}", v.len()))
    })
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// An account on the ledger: a holder, spender, operator, or the engine's
/// own custody account.
///
/// The all-zero address is the "null" destination. It appears as the
/// `from` of mint events and the `to` of burn events and is never a valid
/// transfer recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address whose low 8 bytes hold `n` (big-endian). Handy for fixtures
    /// and well-known system accounts.
    #[must_use]
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    /// Deterministic address derived from a label.
    ///
    /// Every node derives the **same** address for the same label, so system
    /// accounts (e.g. custody) need no coordination.
    #[must_use]
    pub fn derive(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"openledger:address:v1:");
        hasher.update(label.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[..20]);
        Self(bytes)
    }

    /// Random address for tests.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex::<20>(s).map(Self)
    }
}

impl TryFrom<String> for Address {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Opaque 256-bit asset class identifier.
///
/// No registry is needed to use an identifier: any value may be minted and
/// transferred. Whether it is fungible lives in the ledger's kind table, not
/// in the bits of the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(pub [u8; 32]);

impl AssetId {
    /// Reserved identifier for the native currency entry of a disbursement.
    pub const NATIVE: Self = Self([0xff; 32]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Identifier whose low 16 bytes hold `n` (big-endian).
    #[must_use]
    pub fn from_u128(n: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            return write!(f, "native");
        }
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AssetId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "native" {
            return Ok(Self::NATIVE);
        }
        parse_hex::<32>(s).map(Self)
    }
}

impl TryFrom<String> for AssetId {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// PeriodId
// ---------------------------------------------------------------------------

/// Monotonically increasing identifier for a distribution period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PeriodId(pub u64);

impl PeriodId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
