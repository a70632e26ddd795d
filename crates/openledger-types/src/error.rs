//! Error types for the OpenLedger engine.
//!
//! All errors use the `OL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Ledger / balance errors
//! - 2xx: Approval errors
//! - 3xx: Transfer / receiver errors
//! - 4xx: Distribution period errors
//! - 5xx: Claim errors
//! - 8xx: Invariant errors
//! - 9xx: General / internal errors
//!
//! Every error aborts the whole operation that raised it; the engine never
//! leaves partially applied state behind and never retries internally.

use thiserror::Error;

use crate::{Address, Amount, AssetId, PeriodId};

/// Central error enum for all OpenLedger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =================================================================
    // Ledger Errors (1xx)
    // =================================================================
    /// Not enough balance to debit.
    #[error("OL_ERR_100: Insufficient balance of {asset}: need {needed}, have {available}")]
    InsufficientBalance {
        asset: AssetId,
        needed: Amount,
        available: Amount,
    },

    /// A balance or running total would exceed `u128::MAX`.
    #[error("OL_ERR_101: Arithmetic overflow")]
    Overflow,

    /// The asset cannot be registered or used this way.
    #[error("OL_ERR_102: Invalid asset {asset}: {reason}")]
    InvalidAsset { asset: AssetId, reason: String },

    /// A non-fungible asset can only ever have a supply of one.
    #[error("OL_ERR_103: Non-fungible asset {0} supply would exceed one")]
    NonFungibleSupply(AssetId),

    // =================================================================
    // Approval Errors (2xx)
    // =================================================================
    /// Spender's allowance does not cover the requested amount.
    #[error("OL_ERR_200: Insufficient allowance: need {needed}, have {available}")]
    InsufficientAllowance { needed: Amount, available: Amount },

    /// Compare-and-swap approval lost the race: the stored allowance is not
    /// the value the caller expected.
    #[error("OL_ERR_201: Allowance mismatch: expected {expected}, stored {actual}")]
    AllowanceMismatch { expected: Amount, actual: Amount },

    /// An owner cannot appoint itself as its own operator.
    #[error("OL_ERR_202: Invalid operator: {0}")]
    InvalidOperator(Address),

    // =================================================================
    // Transfer Errors (3xx)
    // =================================================================
    /// Paired arrays have unequal length.
    #[error("OL_ERR_300: Arity mismatch: {left} ids vs {right} values")]
    ArityMismatch { left: usize, right: usize },

    /// Destination is the zero address.
    #[error("OL_ERR_301: Invalid recipient: zero address")]
    InvalidRecipient,

    /// The recipient's acceptance hook declined the transfer.
    #[error("OL_ERR_302: Receiver {0} rejected the transfer")]
    ReceiverRejected(Address),

    /// The batch exceeds the configured maximum size.
    #[error("OL_ERR_303: Batch too large: {len} entries, max {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// Caller is not allowed to perform the operation.
    #[error("OL_ERR_304: Unauthorized: {reason}")]
    Unauthorized { reason: String },

    // =================================================================
    // Distribution Period Errors (4xx)
    // =================================================================
    /// The declared allocation is not backed by value moved into custody.
    #[error("OL_ERR_400: Insufficient funding: {reason}")]
    InsufficientFunding { reason: String },

    /// The disbursement request is malformed (dates, asset list, ...).
    #[error("OL_ERR_401: Invalid disbursement: {reason}")]
    InvalidDisbursement { reason: String },

    /// No period with this ID was ever declared.
    #[error("OL_ERR_402: Distribution period not found: {0}")]
    PeriodNotFound(PeriodId),

    /// The period was swept and closed; nothing more can happen in it.
    #[error("OL_ERR_403: Distribution period {0} is closed")]
    PeriodClosed(PeriodId),

    /// Sweep attempted before the clawback date (or without one).
    #[error("OL_ERR_404: Clawback not open for {0}")]
    ClawbackNotOpen(PeriodId),

    /// A payout would exceed the period's unclaimed residual.
    #[error("OL_ERR_405: Allocation exhausted in {period} for {asset}: need {needed}, left {remaining}")]
    AllocationExhausted {
        period: PeriodId,
        asset: AssetId,
        needed: Amount,
        remaining: Amount,
    },

    // =================================================================
    // Claim Errors (5xx)
    // =================================================================
    /// The claimer is not (yet) allowed to claim in this period.
    #[error("OL_ERR_500: Not eligible to claim in {period}: {claimer}")]
    NotEligible { period: PeriodId, claimer: Address },

    /// The claimer already settled its entitlement for this period.
    #[error("OL_ERR_501: Already claimed in {period}: {claimer}")]
    AlreadyClaimed { period: PeriodId, claimer: Address },

    /// The snapshot returned a share outside [0, 1].
    #[error("OL_ERR_502: Invalid entitlement for {claimer}: {reason}")]
    InvalidEntitlement { claimer: Address, reason: String },

    // =================================================================
    // Invariant Errors (8xx)
    // =================================================================
    /// Supply conservation invariant violated: critical safety alert.
    #[error("OL_ERR_800: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("OL_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("OL_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("OL_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk).
    #[error("OL_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
