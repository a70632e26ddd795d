//! # openledger-distribution
//!
//! **Distribution Plane**: distribution periods, entitlement claims,
//! clawback sweeps, and the [`DistributionEngine`] facade.
//!
//! ## Architecture
//!
//! 1. **Collaborators**: external eligibility and entitlement oracles
//! 2. **PeriodManager**: declares and funds periods, tracks residuals,
//!    sweeps them after clawback
//! 3. **ClaimSettlementEngine**: computes owed amounts, settles each
//!    (period, claimer) at most once
//! 4. **DistributionEngine**: access-controlled facade over the ledger and
//!    both managers
//!
//! ## Period Flow
//!
//! ```text
//! disburse (principal → custody) → payout date → claim_for (custody → beneficiary)*
//!     → clawback date → sweep_unclaimed (custody → beneficiary) → CLOSED
//! ```

pub mod claims;
pub mod collaborators;
pub mod engine;
pub mod period_manager;

pub use claims::ClaimSettlementEngine;
pub use collaborators::{AllowAll, AllowList, ClaimAuthorizer, EntitlementSnapshot, FixedEntitlements};
pub use engine::DistributionEngine;
pub use period_manager::PeriodManager;
