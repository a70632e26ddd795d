//! Observable ledger events.
//!
//! Events form an ordered, append-only log consumed by external indexers and
//! auditors. A batch transfer emits one [`LedgerEvent::Transfer`] per
//! (id, value) pair, in call order, so consumers can rebuild per-asset deltas
//! without understanding batches.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, AssetId, AssetKind, PeriodId, Timestamp};

/// Something that happened on the ledger.
///
/// Amounts serialize as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A balance moved. `from` is zero for mints, `to` is zero for burns.
    Transfer {
        operator: Address,
        from: Address,
        to: Address,
        asset: AssetId,
        #[serde(with = "crate::amount_serde")]
        value: Amount,
    },
    /// A per-asset allowance was set (also emitted when unchanged).
    ApprovalChanged {
        owner: Address,
        spender: Address,
        asset: AssetId,
        #[serde(with = "crate::amount_serde")]
        previous: Amount,
        #[serde(with = "crate::amount_serde")]
        current: Amount,
    },
    /// Operator status was granted or revoked (also emitted when unchanged).
    OperatorApprovalChanged {
        owner: Address,
        operator: Address,
        approved: bool,
    },
    /// An asset identifier was tagged with an explicit kind.
    AssetRegistered { asset: AssetId, kind: AssetKind },
    /// A funded distribution period was declared. Unset dates are zero.
    DistributionPeriodStarted {
        period: PeriodId,
        principal: Address,
        ex_date: Timestamp,
        record_date: Timestamp,
        payout_date: Timestamp,
        clawback_date: Timestamp,
        assets: Vec<AssetId>,
        #[serde(with = "crate::amount_serde::many")]
        allocations: Vec<Amount>,
    },
    /// A claimer settled its entitlement; value went to `beneficiary`.
    ClaimSettled {
        period: PeriodId,
        claimer: Address,
        beneficiary: Address,
        assets: Vec<AssetId>,
        #[serde(with = "crate::amount_serde::many")]
        amounts: Vec<Amount>,
    },
    /// The unclaimed residual of a period was clawed back.
    UnclaimedSwept {
        period: PeriodId,
        beneficiary: Address,
        assets: Vec<AssetId>,
        #[serde(with = "crate::amount_serde::many")]
        amounts: Vec<Amount>,
    },
}

impl LedgerEvent {
    /// Short stable name, used as a log field.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::ApprovalChanged { .. } => "approval_changed",
            Self::OperatorApprovalChanged { .. } => "operator_approval_changed",
            Self::AssetRegistered { .. } => "asset_registered",
            Self::DistributionPeriodStarted { .. } => "distribution_period_started",
            Self::ClaimSettled { .. } => "claim_settled",
            Self::UnclaimedSwept { .. } => "unclaimed_swept",
        }
    }
}

/// A logged event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based, gap-free position in the log.
    pub sequence: u64,
    pub event: LedgerEvent,
}
