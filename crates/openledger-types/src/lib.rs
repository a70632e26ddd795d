//! # openledger-types
//!
//! Shared types, errors, and configuration for the **OpenLedger** engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`AssetId`], [`PeriodId`]
//! - **Quantities and time**: [`Amount`], [`AssetKind`], [`Timestamp`]
//! - **Distribution model**: [`DistributionPeriod`], [`DistributionSchedule`],
//!   [`DisbursementRequest`], [`PeriodPhase`], [`ClaimRecord`]
//! - **Events**: [`LedgerEvent`], [`EventRecord`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`LedgerError`] with `OL_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod amount_serde;
pub mod asset;
pub mod config;
pub mod constants;
pub mod distribution;
pub mod error;
pub mod event;
pub mod ids;
pub mod time;

// Re-export all primary types at crate root for ergonomic imports:
//   use openledger_types::{Address, AssetId, LedgerEvent, ...};

pub use asset::*;
pub use config::*;
pub use distribution::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use time::*;

// Constants are accessed via `openledger_types::constants::FOO`
// (not re-exported to avoid name collisions).
