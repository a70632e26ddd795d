//! Receiver acceptance protocol.
//!
//! A recipient that declares itself a token receiver gets a callback after
//! the ledger has already moved value to it. The callback must answer with
//! the exact acceptance marker; anything else makes the
//! [`crate::TransferEngine`] roll the whole transfer back.
//!
//! Callbacks get `&self` and no handle on the engine, so they cannot
//! re-enter it mid-transfer.

use std::collections::HashMap;
use std::fmt;

use openledger_types::{Address, Amount, AssetId, constants};
use serde::{Deserialize, Serialize};

/// The 4-byte answer a receiver returns from its hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceptanceMarker(pub [u8; 4]);

impl AcceptanceMarker {
    /// Accepts a single transfer.
    pub const SINGLE: Self = Self(constants::ACCEPT_SINGLE);
    /// Accepts a batch transfer.
    pub const BATCH: Self = Self(constants::ACCEPT_BATCH);
    /// Any non-matching value rejects; this one reads clearly in code.
    pub const REJECT: Self = Self([0u8; 4]);
}

impl fmt::Display for AcceptanceMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A recipient that wants to vet incoming transfers.
pub trait TokenReceiver: Send + Sync {
    /// Called after a single transfer (or mint) to this receiver.
    /// Return [`AcceptanceMarker::SINGLE`] to accept.
    fn on_receive(
        &self,
        operator: Address,
        from: Address,
        asset: AssetId,
        value: Amount,
        data: &[u8],
    ) -> AcceptanceMarker;

    /// Called once after a batch transfer to this receiver.
    /// Return [`AcceptanceMarker::BATCH`] to accept.
    ///
    /// The default accepts only if [`TokenReceiver::on_receive`] accepts
    /// every pair.
    fn on_batch_receive(
        &self,
        operator: Address,
        from: Address,
        assets: &[AssetId],
        values: &[Amount],
        data: &[u8],
    ) -> AcceptanceMarker {
        let all_accepted = assets.iter().zip(values).all(|(asset, value)| {
            self.on_receive(operator, from, *asset, *value, data) == AcceptanceMarker::SINGLE
        });
        if all_accepted {
            AcceptanceMarker::BATCH
        } else {
            AcceptanceMarker::REJECT
        }
    }
}

/// Addresses that declared themselves receivers, with their hooks.
#[derive(Default)]
pub struct ReceiverRegistry {
    receivers: HashMap<Address, Box<dyn TokenReceiver>>,
}

impl ReceiverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the hook for `address`.
    pub fn register(&mut self, address: Address, receiver: Box<dyn TokenReceiver>) {
        self.receivers.insert(address, receiver);
    }

    /// Drop the hook; the address becomes a plain account again.
    pub fn unregister(&mut self, address: &Address) -> bool {
        self.receivers.remove(address).is_some()
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&dyn TokenReceiver> {
        self.receivers.get(address).map(|receiver| &**receiver)
    }

    #[must_use]
    pub fn is_receiver(&self, address: &Address) -> bool {
        self.receivers.contains_key(address)
    }
}

impl fmt::Debug for ReceiverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverRegistry")
            .field("receivers", &self.receivers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stock receivers
// ---------------------------------------------------------------------------

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TokenReceiver for AcceptAll {
    fn on_receive(&self, _: Address, _: Address, _: AssetId, _: Amount, _: &[u8]) -> AcceptanceMarker {
        AcceptanceMarker::SINGLE
    }
}

/// Rejects everything. Models a contract that cannot handle tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl TokenReceiver for RejectAll {
    fn on_receive(&self, _: Address, _: Address, _: AssetId, _: Amount, _: &[u8]) -> AcceptanceMarker {
        AcceptanceMarker::REJECT
    }
}
