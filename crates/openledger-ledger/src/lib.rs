//! # openledger-ledger
//!
//! **Ledger Plane**: multi-asset balances, allowances, operator grants,
//! atomic single/batch transfers, receiver callbacks, and the event log.
//!
//! ## Architecture
//!
//! 1. **LedgerStore**: per-(asset, owner) balances and asset kind tags
//! 2. **ApprovalManager**: compare-and-swap allowances and operator grants
//! 3. **ReceiverRegistry**: recipients that vet incoming transfers
//! 4. **EventLog**: ordered events with a running SHA-256 digest
//! 5. **SupplyConservation**: Σ balances == minted − burned, per asset
//! 6. **TransferEngine**: the only writer; all-or-nothing operations
//!
//! ## Transfer Flow
//!
//! ```text
//! validate shape → authorize (owner | operator | allowance) → check funds
//!     → apply + journal → receiver hook → commit | rollback
//! ```
//!
//! A transfer that fails at any step leaves balances, allowances and the
//! event log exactly as they were.

pub mod approvals;
pub mod event_log;
pub mod ledger_store;
pub mod receiver;
pub mod supply_conservation;
pub mod transfer;

pub use approvals::ApprovalManager;
pub use event_log::EventLog;
pub use ledger_store::LedgerStore;
pub use receiver::{AcceptAll, AcceptanceMarker, ReceiverRegistry, RejectAll, TokenReceiver};
pub use supply_conservation::SupplyConservation;
pub use transfer::TransferEngine;
