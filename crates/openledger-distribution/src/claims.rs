//! Claim settlement: at-most-once payout of entitlements.
//!
//! Like the trade idempotency guard on the settlement side, every
//! (period, claimer) pair settles at most once. The [`ClaimRecord`] is stored
//! before any value leaves custody, so a receiver hook on the beneficiary
//! already sees the claim as settled. If the payout fails the record and the
//! residual reservation are undone together with the ledger changes.
//!
//! ## Owed amount
//!
//! ```text
//! owed[i] = ⌊ allocation[i] × share(claimer, snapshot_date) ⌋
//! ```
//!
//! `snapshot_date` is the period's record date, or its declaration time when
//! no record date was set. Rounding dust stays in the residual.

use std::collections::HashMap;
use std::fmt;

use openledger_ledger::TransferEngine;
use openledger_types::{
    Address, Amount, AssetId, ClaimRecord, DistributionPeriod, LedgerError, LedgerEvent, PeriodId,
    Result, Timestamp,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::collaborators::{ClaimAuthorizer, EntitlementSnapshot};
use crate::period_manager::{PeriodManager, non_zero, pay_out};

/// Owns every [`ClaimRecord`] and the two external collaborators.
pub struct ClaimSettlementEngine {
    records: HashMap<(PeriodId, Address), ClaimRecord>,
    authorizer: Box<dyn ClaimAuthorizer>,
    snapshot: Box<dyn EntitlementSnapshot>,
}

impl ClaimSettlementEngine {
    #[must_use]
    pub fn new(authorizer: Box<dyn ClaimAuthorizer>, snapshot: Box<dyn EntitlementSnapshot>) -> Self {
        Self {
            records: HashMap::new(),
            authorizer,
            snapshot,
        }
    }

    /// Whether `claimer` may claim in `period` at `now`: the period accepts
    /// claims and the authorizer approves. Unknown periods are not claimable.
    #[must_use]
    pub fn can_claim(&self, periods: &PeriodManager, period: PeriodId, claimer: Address, now: Timestamp) -> bool {
        periods
            .get(period)
            .is_some_and(|p| p.phase_at(now).accepts_claims())
            && self.authorizer.is_eligible(claimer)
    }

    /// What `claimer` would receive from `period`, aligned with its assets.
    /// All zeros once the claimer has settled. Pure: never records anything.
    ///
    /// # Errors
    /// - `PeriodNotFound`
    /// - `InvalidEntitlement` if the snapshot reports a share outside [0, 1]
    /// - `Overflow` if an allocation is too large to scale
    pub fn earnings_owed(
        &self,
        periods: &PeriodManager,
        period: PeriodId,
        claimer: Address,
    ) -> Result<(Vec<AssetId>, Vec<Amount>)> {
        let period = periods.period(period)?;
        Ok((period.assets.clone(), self.owed(period, claimer)?))
    }

    /// The native-currency part of [`ClaimSettlementEngine::earnings_owed`];
    /// zero if the period has no native entry.
    ///
    /// # Errors
    /// As [`ClaimSettlementEngine::earnings_owed`].
    pub fn earnings_owed_native(&self, periods: &PeriodManager, period: PeriodId, claimer: Address) -> Result<Amount> {
        let period = periods.period(period)?;
        let Some(index) = period.native_index() else {
            return Ok(0);
        };
        Ok(self.owed(period, claimer)?[index])
    }

    /// Settle `claimer`'s entitlement in `period`, paying `beneficiary`.
    ///
    /// # Errors
    /// - `PeriodNotFound`
    /// - `PeriodClosed` after the residual was swept
    /// - `NotEligible` before the payout date or if the authorizer refuses
    /// - `AlreadyClaimed` on a second claim; nothing moves
    /// - `InvalidRecipient` for a zero beneficiary
    /// - `InvalidEntitlement` / `AllocationExhausted` if the snapshot's share
    ///   is out of range or over-subscribes the residual
    /// - `ReceiverRejected` if the beneficiary's hook declines; nothing is
    ///   recorded
    pub fn claim_for(
        &mut self,
        ledger: &mut TransferEngine,
        periods: &mut PeriodManager,
        claimer: Address,
        beneficiary: Address,
        period_id: PeriodId,
        now: Timestamp,
    ) -> Result<ClaimRecord> {
        let period = periods.period(period_id)?;
        if period.closed {
            return Err(LedgerError::PeriodClosed(period_id));
        }
        if !self.can_claim(periods, period_id, claimer, now) {
            tracing::warn!(period = %period_id, %claimer, phase = %period.phase_at(now), "Claim refused: not eligible");
            return Err(LedgerError::NotEligible {
                period: period_id,
                claimer,
            });
        }
        if self.is_settled(period_id, claimer) {
            tracing::warn!(period = %period_id, %claimer, "Claim refused: already claimed");
            return Err(LedgerError::AlreadyClaimed {
                period: period_id,
                claimer,
            });
        }
        if beneficiary.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }

        let assets = period.assets.clone();
        let owed = self.owed(period, claimer)?;
        periods.reserve(period_id, &owed)?;

        let record = ClaimRecord {
            period: period_id,
            claimer,
            beneficiary,
            amounts: owed.clone(),
            settled_at: now,
        };
        self.records.insert((period_id, claimer), record.clone());

        let custody = ledger.custody();
        let (pay_assets, pay_amounts) = non_zero(&assets, &owed);
        let settled = LedgerEvent::ClaimSettled {
            period: period_id,
            claimer,
            beneficiary,
            assets,
            amounts: owed.clone(),
        };
        let paid = ledger.atomic(|ledger| {
            pay_out(ledger, custody, beneficiary, &pay_assets, &pay_amounts)?;
            ledger.record_event(settled)?;
            Ok(())
        });
        if let Err(err) = paid {
            self.records.remove(&(period_id, claimer));
            periods.release(period_id, &owed);
            tracing::warn!(period = %period_id, %claimer, %beneficiary, error = %err, "Claim payout failed; settlement undone");
            return Err(err);
        }

        tracing::info!(
            period = %period_id,
            %claimer,
            %beneficiary,
            assets = pay_assets.len(),
            "Claim settled"
        );
        Ok(record)
    }

    // -----------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------

    #[must_use]
    pub fn is_settled(&self, period: PeriodId, claimer: Address) -> bool {
        self.records.contains_key(&(period, claimer))
    }

    #[must_use]
    pub fn record(&self, period: PeriodId, claimer: Address) -> Option<&ClaimRecord> {
        self.records.get(&(period, claimer))
    }

    /// Number of settled claims in `period`.
    #[must_use]
    pub fn settled_count(&self, period: PeriodId) -> usize {
        self.records.keys().filter(|(p, _)| *p == period).count()
    }

    fn owed(&self, period: &DistributionPeriod, claimer: Address) -> Result<Vec<Amount>> {
        if self.is_settled(period.id, claimer) {
            return Ok(vec![0; period.assets.len()]);
        }
        let share = self.snapshot.entitlement_of(claimer, period.snapshot_date());
        if share < Decimal::ZERO || share > Decimal::ONE {
            return Err(LedgerError::InvalidEntitlement {
                claimer,
                reason: format!("share {share} outside [0, 1]"),
            });
        }
        period
            .allocations
            .iter()
            .map(|allocation| scale(*allocation, share))
            .collect()
    }
}

impl fmt::Debug for ClaimSettlementEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimSettlementEngine")
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

/// `⌊allocation × share⌋` for a share in [0, 1].
///
/// With `share = m / 10^s`, the allocation is split as `q·10^s + r` so the
/// whole part `q·m` never exceeds the allocation. Only the remainder term
/// falls back to `Decimal` when `r·m` does not fit in `u128`.
fn scale(allocation: Amount, share: Decimal) -> Result<Amount> {
    if share.is_zero() || allocation == 0 {
        return Ok(0);
    }
    if share == Decimal::ONE {
        return Ok(allocation);
    }
    let mantissa = u128::try_from(share.mantissa()).map_err(|_| LedgerError::Overflow)?;
    let denominator = 10u128.pow(share.scale());
    let (whole, remainder) = (allocation / denominator, allocation % denominator);

    let whole = whole.checked_mul(mantissa).ok_or(LedgerError::Overflow)?;
    let part = match remainder.checked_mul(mantissa) {
        Some(product) => product / denominator,
        None => Decimal::from_u128(remainder)
            .and_then(|remainder| remainder.checked_mul(share))
            .and_then(|part| part.floor().to_u128())
            .ok_or(LedgerError::Overflow)?,
    };
    whole.checked_add(part).ok_or(LedgerError::Overflow)
}
