//! Distribution period and claim types.
//!
//! ## Lifecycle
//!
//! ```text
//!   ┌──────────┐ now ≥ payout ┌────────────┐ now ≥ clawback ┌───────────────┐  sweep  ┌────────┐
//!   │ DECLARED ├─────────────▶│ PAYOUT_OPEN├───────────────▶│ CLAWBACK_OPEN ├────────▶│ CLOSED │
//!   └──────────┘              └────────────┘                └───────────────┘         └────────┘
//! ```
//!
//! The first three phases are derived purely from the caller-supplied time
//! and the declared dates. Only CLOSED is stored, and only the disbursing
//! principal can reach it, by sweeping the unclaimed residual.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, AssetId, LedgerError, PeriodId, Result, Timestamp};

/// The lifecycle phase of a distribution period. Ordered: a period only ever
/// moves forward through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodPhase {
    /// Declared and funded; payout date not reached.
    Declared,
    /// Claims are honored.
    PayoutOpen,
    /// Claims still honored; the residual may be swept.
    ClawbackOpen,
    /// Residual swept. Terminal.
    Closed,
}

impl PeriodPhase {
    /// Whether claims are honored in this phase.
    #[must_use]
    pub fn accepts_claims(self) -> bool {
        matches!(self, Self::PayoutOpen | Self::ClawbackOpen)
    }
}

impl fmt::Display for PeriodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared => write!(f, "DECLARED"),
            Self::PayoutOpen => write!(f, "PAYOUT_OPEN"),
            Self::ClawbackOpen => write!(f, "CLAWBACK_OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

// ---------------------------------------------------------------------------
// DistributionSchedule
// ---------------------------------------------------------------------------

/// The four dates of a distribution period. Unset optional dates are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistributionSchedule {
    pub ex_date: Timestamp,
    pub record_date: Timestamp,
    /// Mandatory.
    pub payout_date: Timestamp,
    pub clawback_date: Timestamp,
}

impl DistributionSchedule {
    /// A schedule with only the mandatory payout date.
    #[must_use]
    pub fn payout_at(payout_date: Timestamp) -> Self {
        Self {
            payout_date,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ex_date(mut self, ex_date: Timestamp) -> Self {
        self.ex_date = ex_date;
        self
    }

    #[must_use]
    pub fn with_record_date(mut self, record_date: Timestamp) -> Self {
        self.record_date = record_date;
        self
    }

    #[must_use]
    pub fn with_clawback_date(mut self, clawback_date: Timestamp) -> Self {
        self.clawback_date = clawback_date;
        self
    }

    /// Check date ordering: ex ≤ record ≤ payout for the dates that are set,
    /// and clawback ≥ payout when set.
    ///
    /// # Errors
    /// Returns [`LedgerError::InvalidDisbursement`] naming the violated rule.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(LedgerError::InvalidDisbursement { reason });

        if !self.payout_date.is_set() {
            return invalid("payout date is mandatory".to_string());
        }
        if self.record_date.is_set() && self.record_date > self.payout_date {
            return invalid(format!(
                "record date {} is after payout date {}",
                self.record_date, self.payout_date
            ));
        }
        if self.ex_date.is_set() {
            let upper = if self.record_date.is_set() {
                self.record_date
            } else {
                self.payout_date
            };
            if self.ex_date > upper {
                return invalid(format!("ex date {} is after {upper}", self.ex_date));
            }
        }
        if self.clawback_date.is_set() && self.clawback_date < self.payout_date {
            return invalid(format!(
                "clawback date {} is before payout date {}",
                self.clawback_date, self.payout_date
            ));
        }
        Ok(())
    }

    /// Phase implied by the dates alone (never [`PeriodPhase::Closed`]).
    #[must_use]
    pub fn phase_at(&self, now: Timestamp) -> PeriodPhase {
        if self.clawback_date.is_set() && now >= self.clawback_date {
            PeriodPhase::ClawbackOpen
        } else if now >= self.payout_date {
            PeriodPhase::PayoutOpen
        } else {
            PeriodPhase::Declared
        }
    }
}

// ---------------------------------------------------------------------------
// DisbursementRequest
// ---------------------------------------------------------------------------

/// What a disbursing principal asks the engine to distribute.
///
/// `assets` and `allocations` are paired by index. The last asset may be
/// [`AssetId::NATIVE`], in which case its allocation is funded by the native
/// value attached to the call rather than from the principal's ledger balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementRequest {
    pub schedule: DistributionSchedule,
    pub assets: Vec<AssetId>,
    pub allocations: Vec<Amount>,
    /// Where the clawback sweep sends the residual. Defaults to the principal.
    pub clawback_beneficiary: Option<Address>,
}

impl DisbursementRequest {
    #[must_use]
    pub fn new(schedule: DistributionSchedule, assets: Vec<AssetId>, allocations: Vec<Amount>) -> Self {
        Self {
            schedule,
            assets,
            allocations,
            clawback_beneficiary: None,
        }
    }

    #[must_use]
    pub fn with_clawback_beneficiary(mut self, beneficiary: Address) -> Self {
        self.clawback_beneficiary = Some(beneficiary);
        self
    }

    /// Allocation of the native entry, zero if there is none.
    #[must_use]
    pub fn native_allocation(&self) -> Amount {
        self.assets
            .iter()
            .zip(&self.allocations)
            .find(|(asset, _)| asset.is_native())
            .map_or(0, |(_, amount)| *amount)
    }
}

// ---------------------------------------------------------------------------
// DistributionPeriod
// ---------------------------------------------------------------------------

/// One funded disbursement episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPeriod {
    pub id: PeriodId,
    /// The party that funded the period; the only one who may sweep it.
    pub principal: Address,
    pub declared_at: Timestamp,
    pub schedule: DistributionSchedule,
    pub assets: Vec<AssetId>,
    /// Total declared allocation per asset. Never changes.
    pub allocations: Vec<Amount>,
    /// Allocation not yet paid out, per asset.
    pub unclaimed: Vec<Amount>,
    pub clawback_beneficiary: Address,
    /// Set once the residual has been swept.
    pub closed: bool,
}

impl DistributionPeriod {
    /// Current phase. CLOSED wins over anything the dates say.
    #[must_use]
    pub fn phase_at(&self, now: Timestamp) -> PeriodPhase {
        if self.closed {
            PeriodPhase::Closed
        } else {
            self.schedule.phase_at(now)
        }
    }

    /// The date entitlements are evaluated at: the record date if set,
    /// otherwise the declaration time.
    #[must_use]
    pub fn snapshot_date(&self) -> Timestamp {
        if self.schedule.record_date.is_set() {
            self.schedule.record_date
        } else {
            self.declared_at
        }
    }

    /// Index of the native entry, if the period disburses native currency.
    #[must_use]
    pub fn native_index(&self) -> Option<usize> {
        self.assets.iter().position(AssetId::is_native)
    }

    /// Whether any asset still has an unclaimed residual.
    #[must_use]
    pub fn has_residual(&self) -> bool {
        self.unclaimed.iter().any(|amount| *amount > 0)
    }
}

// ---------------------------------------------------------------------------
// ClaimRecord
// ---------------------------------------------------------------------------

/// Proof that a claimer settled its entitlement in a period. Immutable once
/// stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub period: PeriodId,
    pub claimer: Address,
    pub beneficiary: Address,
    /// Paid amounts, index-aligned with the period's assets.
    pub amounts: Vec<Amount>,
    pub settled_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(n: u64) -> Timestamp {
        Timestamp(n)
    }

    #[test]
    fn payout_is_mandatory() {
        let err = DistributionSchedule::default().validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidDisbursement { .. }));
    }

    #[test]
    fn valid_full_schedule() {
        let s = DistributionSchedule::payout_at(ts(100))
            .with_ex_date(ts(50))
            .with_record_date(ts(60))
            .with_clawback_date(ts(200));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn record_after_payout_rejected() {
        let s = DistributionSchedule::payout_at(ts(100)).with_record_date(ts(101));
        assert!(s.validate().is_err());
    }

    #[test]
    fn ex_after_record_rejected() {
        let s = DistributionSchedule::payout_at(ts(100))
            .with_ex_date(ts(70))
            .with_record_date(ts(60));
        assert!(s.validate().is_err());
    }

    #[test]
    fn ex_checked_against_payout_without_record() {
        let s = DistributionSchedule::payout_at(ts(100)).with_ex_date(ts(150));
        assert!(s.validate().is_err());
    }

    #[test]
    fn clawback_before_payout_rejected() {
        let s = DistributionSchedule::payout_at(ts(100)).with_clawback_date(ts(99));
        assert!(s.validate().is_err());
        let same = DistributionSchedule::payout_at(ts(100)).with_clawback_date(ts(100));
        assert!(same.validate().is_ok());
    }

    #[test]
    fn phase_progression() {
        let s = DistributionSchedule::payout_at(ts(100)).with_clawback_date(ts(200));
        assert_eq!(s.phase_at(ts(99)), PeriodPhase::Declared);
        assert_eq!(s.phase_at(ts(100)), PeriodPhase::PayoutOpen);
        assert_eq!(s.phase_at(ts(199)), PeriodPhase::PayoutOpen);
        assert_eq!(s.phase_at(ts(200)), PeriodPhase::ClawbackOpen);
    }

    #[test]
    fn no_clawback_date_never_opens_clawback() {
        let s = DistributionSchedule::payout_at(ts(100));
        assert_eq!(s.phase_at(ts(u64::MAX)), PeriodPhase::PayoutOpen);
    }

    #[test]
    fn phases_are_ordered() {
        assert!(PeriodPhase::Declared < PeriodPhase::PayoutOpen);
        assert!(PeriodPhase::PayoutOpen < PeriodPhase::ClawbackOpen);
        assert!(PeriodPhase::ClawbackOpen < PeriodPhase::Closed);
        assert!(!PeriodPhase::Declared.accepts_claims());
        assert!(PeriodPhase::ClawbackOpen.accepts_claims());
        assert!(!PeriodPhase::Closed.accepts_claims());
    }

    #[test]
    fn native_allocation_lookup() {
        let req = DisbursementRequest::new(
            DistributionSchedule::payout_at(ts(10)),
            vec![AssetId::from_u128(1), AssetId::NATIVE],
            vec![100, 7],
        );
        assert_eq!(req.native_allocation(), 7);
    }

    #[test]
    fn snapshot_date_falls_back_to_declaration() {
        let mut period = DistributionPeriod {
            id: PeriodId(0),
            principal: Address::from_low_u64(1),
            declared_at: ts(5),
            schedule: DistributionSchedule::payout_at(ts(10)),
            assets: vec![AssetId::from_u128(1)],
            allocations: vec![10],
            unclaimed: vec![10],
            clawback_beneficiary: Address::from_low_u64(1),
            closed: false,
        };
        assert_eq!(period.snapshot_date(), ts(5));
        period.schedule.record_date = ts(8);
        assert_eq!(period.snapshot_date(), ts(8));
        assert!(period.native_index().is_none());
        assert!(period.has_residual());
        period.closed = true;
        assert_eq!(period.phase_at(ts(1)), PeriodPhase::Closed);
    }
}
