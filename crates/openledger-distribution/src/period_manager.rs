//! Distribution period manager: declares, funds and sweeps periods.
//!
//! A period only exists once its full allocation sits in custody. Funding
//! and declaration run inside one [`TransferEngine::atomic`] scope:
//!
//! 1. Move every token allocation from the principal's balance to custody
//! 2. Mint the attached native value into custody
//! 3. Emit `DistributionPeriodStarted`
//!
//! If any step fails, nothing moved and no period is recorded.
//!
//! Each period keeps a per-asset unclaimed residual. Claims reserve against
//! it; the principal sweeps what is left once clawback opens, which closes
//! the period.

use std::collections::{BTreeMap, HashSet};

use openledger_ledger::TransferEngine;
use openledger_types::{
    Address, Amount, AssetId, DisbursementRequest, DistributionPeriod, LedgerError, LedgerEvent,
    PeriodId, PeriodPhase, Result, Timestamp,
};

/// Owns every [`DistributionPeriod`], keyed by ID in declaration order.
#[derive(Debug)]
pub struct PeriodManager {
    periods: BTreeMap<PeriodId, DistributionPeriod>,
    /// ID the next declared period receives.
    next_id: PeriodId,
}

impl PeriodManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            periods: BTreeMap::new(),
            next_id: PeriodId(1),
        }
    }

    // -----------------------------------------------------------------
    // Declaration
    // -----------------------------------------------------------------

    /// Check a request's shape and native funding without touching state.
    ///
    /// # Errors
    /// - `ArityMismatch` if assets and allocations differ in length
    /// - `BatchTooLarge` if there are more assets than a batch may carry
    /// - `InvalidDisbursement` for an empty asset list, duplicate assets, a
    ///   native entry that is not last, or bad dates
    /// - `InvalidRecipient` for a zero clawback beneficiary
    /// - `InsufficientFunding` if `attached_native` differs from the native
    ///   allocation
    pub fn validate(request: &DisbursementRequest, attached_native: Amount, max_batch_size: usize) -> Result<()> {
        let invalid = |reason: &str| LedgerError::InvalidDisbursement {
            reason: reason.to_string(),
        };

        if request.assets.len() != request.allocations.len() {
            return Err(LedgerError::ArityMismatch {
                left: request.assets.len(),
                right: request.allocations.len(),
            });
        }
        if request.assets.is_empty() {
            return Err(invalid("no assets to distribute"));
        }
        if request.assets.len() > max_batch_size {
            return Err(LedgerError::BatchTooLarge {
                len: request.assets.len(),
                max: max_batch_size,
            });
        }
        let last = request.assets.len() - 1;
        if request.assets[..last].iter().any(AssetId::is_native) {
            return Err(invalid("the native asset must be the last entry"));
        }
        let mut seen = HashSet::with_capacity(request.assets.len());
        if !request.assets.iter().all(|asset| seen.insert(*asset)) {
            return Err(invalid("duplicate asset"));
        }
        request.schedule.validate()?;
        if request.clawback_beneficiary.is_some_and(|b| b.is_zero()) {
            return Err(LedgerError::InvalidRecipient);
        }

        let native = request.native_allocation();
        if attached_native != native {
            return Err(LedgerError::InsufficientFunding {
                reason: format!("attached native value {attached_native} != native allocation {native}"),
            });
        }
        Ok(())
    }

    /// Declare and fund a new period on behalf of `principal`.
    ///
    /// # Errors
    /// Everything [`PeriodManager::validate`] returns, plus
    /// `InsufficientFunding` if the principal's balance cannot cover a token
    /// allocation and `Overflow` if custody cannot absorb the native value.
    pub fn disburse(
        &mut self,
        ledger: &mut TransferEngine,
        principal: Address,
        request: DisbursementRequest,
        attached_native: Amount,
        now: Timestamp,
    ) -> Result<PeriodId> {
        Self::validate(&request, attached_native, ledger.max_batch_size())?;

        let custody = ledger.custody();
        let native = request.native_allocation();
        if native > 0 && !ledger.can_mint(custody, AssetId::NATIVE, native) {
            return Err(LedgerError::Overflow);
        }
        let (token_assets, token_amounts): (Vec<AssetId>, Vec<Amount>) = request
            .assets
            .iter()
            .zip(&request.allocations)
            .filter(|(asset, _)| !asset.is_native())
            .map(|(asset, amount)| (*asset, *amount))
            .unzip();

        let id = self.next_id;
        let schedule = request.schedule;
        let started = LedgerEvent::DistributionPeriodStarted {
            period: id,
            principal,
            ex_date: schedule.ex_date,
            record_date: schedule.record_date,
            payout_date: schedule.payout_date,
            clawback_date: schedule.clawback_date,
            assets: request.assets.clone(),
            allocations: request.allocations.clone(),
        };

        ledger.atomic(|ledger| {
            if !token_assets.is_empty() {
                ledger
                    .batch_transfer(principal, principal, custody, &token_assets, &token_amounts, &[])
                    .map_err(as_funding_error)?;
            }
            if native > 0 {
                ledger.mint(principal, custody, AssetId::NATIVE, native, &[])?;
            }
            ledger.record_event(started)?;
            Ok(())
        })?;

        let period = DistributionPeriod {
            id,
            principal,
            declared_at: now,
            schedule,
            unclaimed: request.allocations.clone(),
            assets: request.assets,
            allocations: request.allocations,
            clawback_beneficiary: request.clawback_beneficiary.unwrap_or(principal),
            closed: false,
        };
        tracing::info!(
            period = %id,
            %principal,
            assets = period.assets.len(),
            native,
            payout = %schedule.payout_date,
            clawback = %schedule.clawback_date,
            "Distribution period declared"
        );
        self.periods.insert(id, period);
        self.next_id = id.next();
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------

    #[must_use]
    pub fn get(&self, id: PeriodId) -> Option<&DistributionPeriod> {
        self.periods.get(&id)
    }

    /// # Errors
    /// Returns `PeriodNotFound` if no such period was declared.
    pub fn period(&self, id: PeriodId) -> Result<&DistributionPeriod> {
        self.periods.get(&id).ok_or(LedgerError::PeriodNotFound(id))
    }

    /// # Errors
    /// Returns `PeriodNotFound` if no such period was declared.
    pub fn phase(&self, id: PeriodId, now: Timestamp) -> Result<PeriodPhase> {
        Ok(self.period(id)?.phase_at(now))
    }

    /// The most recently declared period.
    #[must_use]
    pub fn latest(&self) -> Option<&DistributionPeriod> {
        self.periods.values().next_back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DistributionPeriod> {
        self.periods.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Σ unclaimed residual of `asset` over all open periods. Custody must
    /// hold exactly this much.
    #[must_use]
    pub fn outstanding(&self, asset: AssetId) -> Amount {
        self.periods
            .values()
            .filter(|p| !p.closed)
            .flat_map(|p| p.assets.iter().zip(&p.unclaimed))
            .filter(|(a, _)| **a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }

    // -----------------------------------------------------------------
    // Residual bookkeeping
    // -----------------------------------------------------------------

    /// Take `amounts` (aligned with the period's assets) out of the residual.
    ///
    /// # Errors
    /// - `PeriodNotFound`
    /// - `ArityMismatch` if `amounts` is not aligned with the assets
    /// - `AllocationExhausted` if any amount exceeds what is left; the
    ///   residual is then unchanged
    pub fn reserve(&mut self, id: PeriodId, amounts: &[Amount]) -> Result<()> {
        let period = self.periods.get_mut(&id).ok_or(LedgerError::PeriodNotFound(id))?;
        if amounts.len() != period.unclaimed.len() {
            return Err(LedgerError::ArityMismatch {
                left: period.unclaimed.len(),
                right: amounts.len(),
            });
        }
        for ((asset, remaining), needed) in period.assets.iter().zip(&period.unclaimed).zip(amounts) {
            if needed > remaining {
                return Err(LedgerError::AllocationExhausted {
                    period: id,
                    asset: *asset,
                    needed: *needed,
                    remaining: *remaining,
                });
            }
        }
        for (remaining, needed) in period.unclaimed.iter_mut().zip(amounts) {
            *remaining -= needed;
        }
        Ok(())
    }

    /// Give back a reservation whose payout was rolled back.
    pub(crate) fn release(&mut self, id: PeriodId, amounts: &[Amount]) {
        if let Some(period) = self.periods.get_mut(&id) {
            for (remaining, amount) in period.unclaimed.iter_mut().zip(amounts) {
                *remaining = remaining.saturating_add(*amount);
            }
        }
    }

    // -----------------------------------------------------------------
    // Clawback
    // -----------------------------------------------------------------

    /// Sweep the unclaimed residual to the period's clawback beneficiary and
    /// close the period. Returns the swept amounts, aligned with the assets.
    ///
    /// # Errors
    /// - `PeriodNotFound`
    /// - `Unauthorized` if `caller` is not the principal
    /// - `PeriodClosed` if already swept
    /// - `ClawbackNotOpen` before the clawback date, or if none was set
    /// - `ReceiverRejected` if the beneficiary's hook declines
    pub fn sweep_unclaimed(
        &mut self,
        ledger: &mut TransferEngine,
        caller: Address,
        id: PeriodId,
        now: Timestamp,
    ) -> Result<Vec<Amount>> {
        let period = self.period(id)?;
        if caller != period.principal {
            return Err(LedgerError::Unauthorized {
                reason: format!("only the principal of {id} may sweep it"),
            });
        }
        match period.phase_at(now) {
            PeriodPhase::Closed => return Err(LedgerError::PeriodClosed(id)),
            PeriodPhase::ClawbackOpen => {}
            PeriodPhase::Declared | PeriodPhase::PayoutOpen => {
                return Err(LedgerError::ClawbackNotOpen(id));
            }
        }

        let custody = ledger.custody();
        let beneficiary = period.clawback_beneficiary;
        let assets = period.assets.clone();
        let residual = period.unclaimed.clone();
        let (pay_assets, pay_amounts) = non_zero(&assets, &residual);
        let swept = LedgerEvent::UnclaimedSwept {
            period: id,
            beneficiary,
            assets,
            amounts: residual.clone(),
        };

        ledger.atomic(|ledger| {
            pay_out(ledger, custody, beneficiary, &pay_assets, &pay_amounts)?;
            ledger.record_event(swept)?;
            Ok(())
        })?;

        if let Some(period) = self.periods.get_mut(&id) {
            period.unclaimed.iter_mut().for_each(|amount| *amount = 0);
            period.closed = true;
        }
        tracing::info!(period = %id, %beneficiary, assets = pay_assets.len(), "Unclaimed residual swept; period closed");
        Ok(residual)
    }
}

impl Default for PeriodManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pairs with a non-zero amount.
pub(crate) fn non_zero(assets: &[AssetId], amounts: &[Amount]) -> (Vec<AssetId>, Vec<Amount>) {
    assets
        .iter()
        .zip(amounts)
        .filter(|(_, amount)| **amount > 0)
        .map(|(asset, amount)| (*asset, *amount))
        .unzip()
}

/// Move value out of custody: a single transfer for one asset, a batch for
/// several, nothing for none.
pub(crate) fn pay_out(
    ledger: &mut TransferEngine,
    custody: Address,
    to: Address,
    assets: &[AssetId],
    amounts: &[Amount],
) -> Result<()> {
    match (assets, amounts) {
        ([], _) => Ok(()),
        ([asset], [amount]) => ledger.transfer(custody, custody, to, *asset, *amount, &[]),
        _ => ledger.batch_transfer(custody, custody, to, assets, amounts, &[]),
    }
}

/// A principal that can't cover its allocation has not funded the period.
fn as_funding_error(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::InsufficientBalance {
            asset,
            needed,
            available,
        } => LedgerError::InsufficientFunding {
            reason: format!("principal holds {available} of {asset}, allocation needs {needed}"),
        },
        other => other,
    }
}
