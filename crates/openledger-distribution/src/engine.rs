//! Engine facade: the single public entry point.
//!
//! Every mutating call names its `caller` and goes through the access rules
//! here before reaching the planes underneath:
//!
//! - only the configured admin mints and registers asset kinds
//! - the native asset is never minted or registered directly
//! - the custody account is never a caller, a transfer recipient, or a
//!   receiver, so custody always holds exactly the unclaimed residual of
//!   open periods
//!
//! The facade is exclusively borrowed for the duration of each call, which
//! makes re-entrancy from a receiver hook impossible.

use openledger_ledger::{EventLog, TokenReceiver, TransferEngine};
use openledger_types::{
    constants, Address, Amount, AssetId, AssetKind, ClaimRecord, DisbursementRequest, DistributionPeriod,
    EngineConfig, LedgerError, PeriodId, PeriodPhase, Result, Timestamp,
};

use crate::claims::ClaimSettlementEngine;
use crate::collaborators::{ClaimAuthorizer, EntitlementSnapshot};
use crate::period_manager::PeriodManager;

/// Multi-asset ledger plus periodic returns distribution.
#[derive(Debug)]
pub struct DistributionEngine {
    config: EngineConfig,
    ledger: TransferEngine,
    periods: PeriodManager,
    claims: ClaimSettlementEngine,
}

impl DistributionEngine {
    /// Build an engine from a validated config and its two collaborators.
    ///
    /// # Errors
    /// Returns `Configuration` if the config is invalid.
    pub fn new(
        config: EngineConfig,
        authorizer: Box<dyn ClaimAuthorizer>,
        snapshot: Box<dyn EntitlementSnapshot>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            admin = %config.admin,
            custody = %config.custody,
            max_batch_size = config.max_batch_size,
            "Distribution engine started"
        );
        Ok(Self {
            ledger: TransferEngine::new(&config),
            periods: PeriodManager::new(),
            claims: ClaimSettlementEngine::new(authorizer, snapshot),
            config,
        })
    }

    // =================================================================
    // Access rules
    // =================================================================

    fn ensure_caller(&self, caller: Address) -> Result<()> {
        if caller.is_zero() {
            return Err(LedgerError::Unauthorized {
                reason: "zero address cannot act".to_string(),
            });
        }
        if caller == self.config.custody {
            return Err(LedgerError::Unauthorized {
                reason: "custody account cannot act".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_admin(&self, caller: Address) -> Result<()> {
        self.ensure_caller(caller)?;
        if caller != self.config.admin {
            return Err(LedgerError::Unauthorized {
                reason: format!("{caller} is not the admin"),
            });
        }
        Ok(())
    }

    fn ensure_owner(&self, caller: Address, address: Address) -> Result<()> {
        self.ensure_caller(caller)?;
        if caller != address {
            return Err(LedgerError::Unauthorized {
                reason: format!("{caller} cannot act for {address}"),
            });
        }
        Ok(())
    }

    fn ensure_recipient(&self, to: Address) -> Result<()> {
        if to.is_zero() || to == self.config.custody {
            return Err(LedgerError::InvalidRecipient);
        }
        Ok(())
    }

    // =================================================================
    // Ledger views
    // =================================================================

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn custody(&self) -> Address {
        self.config.custody
    }

    #[must_use]
    pub fn balance_of(&self, asset: AssetId, owner: Address) -> Amount {
        self.ledger.balance_of(asset, owner)
    }

    /// # Errors
    /// Returns `ArityMismatch` if the slices differ in length.
    pub fn balance_of_batch(&self, owners: &[Address], assets: &[AssetId]) -> Result<Vec<Amount>> {
        self.ledger.balance_of_batch(owners, assets)
    }

    #[must_use]
    pub fn allowance(&self, owner: Address, spender: Address, asset: AssetId) -> Amount {
        self.ledger.allowance(owner, spender, asset)
    }

    #[must_use]
    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.ledger.is_approved_for_all(owner, operator)
    }

    #[must_use]
    pub fn total_supply(&self, asset: AssetId) -> Amount {
        self.ledger.total_supply(asset)
    }

    #[must_use]
    pub fn kind_of(&self, asset: AssetId) -> AssetKind {
        self.ledger.kind_of(asset)
    }

    #[must_use]
    pub fn owner_of(&self, asset: AssetId) -> Option<Address> {
        self.ledger.owner_of(asset)
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        self.ledger.events()
    }

    /// # Errors
    /// Returns `SupplyInvariantViolation` if Σ balances ≠ minted − burned.
    pub fn verify_supply(&self, asset: AssetId) -> Result<()> {
        self.ledger.verify_supply(asset)
    }

    /// Check every tracked asset's supply and that custody holds exactly the
    /// unclaimed residual of every open period.
    ///
    /// # Errors
    /// Returns `SupplyInvariantViolation` naming the first broken invariant.
    pub fn verify_invariants(&self) -> Result<()> {
        self.ledger.verify_all_supply()?;
        let custody = self.config.custody;
        let assets = self
            .periods
            .iter()
            .flat_map(|p| p.assets.iter().copied())
            .collect::<std::collections::BTreeSet<_>>();
        for asset in assets {
            let held = self.ledger.balance_of(asset, custody);
            let outstanding = self.periods.outstanding(asset);
            if held != outstanding {
                return Err(LedgerError::SupplyInvariantViolation {
                    reason: format!("custody holds {held} of {asset}, open periods owe {outstanding}"),
                });
            }
        }
        Ok(())
    }

    // =================================================================
    // Ledger operations
    // =================================================================

    /// Tag `asset` with a kind. Admin only.
    ///
    /// # Errors
    /// `Unauthorized`, or `InvalidAsset` for native, re-registered or already
    /// minted assets.
    pub fn register_asset(&mut self, caller: Address, asset: AssetId, kind: AssetKind) -> Result<()> {
        self.ensure_admin(caller)?;
        self.ledger.register_asset(asset, kind)
    }

    /// Create new supply. Admin only; the native asset is minted only by
    /// funding a disbursement.
    ///
    /// # Errors
    /// `Unauthorized`, `InvalidAsset`, `InvalidRecipient`, `NonFungibleSupply`,
    /// `Overflow` or `ReceiverRejected`.
    pub fn mint(&mut self, caller: Address, to: Address, asset: AssetId, amount: Amount, data: &[u8]) -> Result<()> {
        self.ensure_admin(caller)?;
        if asset.is_native() {
            return Err(LedgerError::InvalidAsset {
                asset,
                reason: "native value enters only through disbursement".to_string(),
            });
        }
        self.ensure_recipient(to)?;
        self.ledger.mint(caller, to, asset, amount, data)
    }

    /// Destroy `amount` of `from`'s balance, authorized like a transfer.
    ///
    /// # Errors
    /// `Unauthorized`, `InsufficientAllowance` or `InsufficientBalance`.
    pub fn burn(&mut self, caller: Address, from: Address, asset: AssetId, amount: Amount) -> Result<()> {
        self.ensure_caller(caller)?;
        self.ledger.burn(caller, from, asset, amount)
    }

    /// Compare-and-swap the allowance `caller` grants `spender`.
    ///
    /// # Errors
    /// `Unauthorized` or `AllowanceMismatch`.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        asset: AssetId,
        expected_current: Amount,
        new_value: Amount,
    ) -> Result<()> {
        self.ensure_caller(caller)?;
        self.ledger
            .approve(caller, spender, asset, expected_current, new_value)
    }

    /// # Errors
    /// `Unauthorized` or `InvalidOperator`.
    pub fn set_approval_for_all(&mut self, caller: Address, operator: Address, approved: bool) -> Result<()> {
        self.ensure_caller(caller)?;
        self.ledger.set_approval_for_all(caller, operator, approved)
    }

    /// # Errors
    /// See [`TransferEngine::transfer`]; additionally `Unauthorized` for the
    /// custody caller and `InvalidRecipient` for a custody recipient.
    pub fn transfer(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        asset: AssetId,
        value: Amount,
        data: &[u8],
    ) -> Result<()> {
        self.ensure_caller(caller)?;
        self.ensure_recipient(to)?;
        self.ledger.transfer(caller, from, to, asset, value, data)
    }

    /// # Errors
    /// See [`TransferEngine::batch_transfer`]; custody rules as for
    /// [`DistributionEngine::transfer`].
    pub fn batch_transfer(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        assets: &[AssetId],
        values: &[Amount],
        data: &[u8],
    ) -> Result<()> {
        self.ensure_caller(caller)?;
        self.ensure_recipient(to)?;
        self.ledger
            .batch_transfer(caller, from, to, assets, values, data)
    }

    /// Declare `caller` a receiver whose hook vets every incoming transfer.
    /// An address can only declare itself.
    ///
    /// # Errors
    /// `Unauthorized` unless `caller == address`. The custody account can
    /// never call, so it never carries a hook.
    pub fn register_receiver(
        &mut self,
        caller: Address,
        address: Address,
        receiver: Box<dyn TokenReceiver>,
    ) -> Result<()> {
        self.ensure_owner(caller, address)?;
        self.ledger.register_receiver(address, receiver);
        Ok(())
    }

    /// Drop `caller`'s own receiver hook. Returns whether one was registered.
    ///
    /// # Errors
    /// `Unauthorized` unless `caller == address`.
    pub fn unregister_receiver(&mut self, caller: Address, address: Address) -> Result<bool> {
        self.ensure_owner(caller, address)?;
        Ok(self.ledger.unregister_receiver(address))
    }

    // =================================================================
    // Distribution
    // =================================================================

    /// Declare and fund a distribution period with `caller` as principal.
    ///
    /// # Errors
    /// See [`PeriodManager::disburse`].
    pub fn disburse(
        &mut self,
        caller: Address,
        request: DisbursementRequest,
        attached_native: Amount,
        now: Timestamp,
    ) -> Result<PeriodId> {
        self.ensure_caller(caller)?;
        if let Some(beneficiary) = request.clawback_beneficiary {
            self.ensure_recipient(beneficiary)?;
        }
        self.periods
            .disburse(&mut self.ledger, caller, request, attached_native, now)
    }

    #[must_use]
    pub fn period(&self, id: PeriodId) -> Option<&DistributionPeriod> {
        self.periods.get(id)
    }

    #[must_use]
    pub fn latest_period(&self) -> Option<&DistributionPeriod> {
        self.periods.latest()
    }

    /// # Errors
    /// Returns `PeriodNotFound`.
    pub fn phase(&self, id: PeriodId, now: Timestamp) -> Result<PeriodPhase> {
        self.periods.phase(id, now)
    }

    #[must_use]
    pub fn can_claim(&self, period: PeriodId, claimer: Address, now: Timestamp) -> bool {
        claimer != self.config.custody && self.claims.can_claim(&self.periods, period, claimer, now)
    }

    /// # Errors
    /// See [`ClaimSettlementEngine::earnings_owed`].
    pub fn earnings_owed(&self, period: PeriodId, claimer: Address) -> Result<(Vec<AssetId>, Vec<Amount>)> {
        self.claims.earnings_owed(&self.periods, period, claimer)
    }

    /// # Errors
    /// See [`ClaimSettlementEngine::earnings_owed_native`].
    pub fn earnings_owed_native(&self, period: PeriodId, claimer: Address) -> Result<Amount> {
        self.claims.earnings_owed_native(&self.periods, period, claimer)
    }

    /// Claim `caller`'s own entitlement to itself.
    ///
    /// # Errors
    /// See [`ClaimSettlementEngine::claim_for`].
    pub fn claim(&mut self, caller: Address, period: PeriodId, now: Timestamp) -> Result<ClaimRecord> {
        self.claim_for(caller, caller, period, now)
    }

    /// Claim `caller`'s entitlement and pay it to `beneficiary`.
    ///
    /// # Errors
    /// See [`ClaimSettlementEngine::claim_for`]; `Unauthorized` for the
    /// custody caller and `InvalidRecipient` for a custody beneficiary.
    pub fn claim_for(
        &mut self,
        caller: Address,
        beneficiary: Address,
        period: PeriodId,
        now: Timestamp,
    ) -> Result<ClaimRecord> {
        self.ensure_caller(caller)?;
        self.ensure_recipient(beneficiary)?;
        self.claims
            .claim_for(&mut self.ledger, &mut self.periods, caller, beneficiary, period, now)
    }

    #[must_use]
    pub fn claim_record(&self, period: PeriodId, claimer: Address) -> Option<&ClaimRecord> {
        self.claims.record(period, claimer)
    }

    /// Sweep a period's unclaimed residual to its clawback beneficiary.
    ///
    /// # Errors
    /// See [`PeriodManager::sweep_unclaimed`].
    pub fn sweep_unclaimed(&mut self, caller: Address, period: PeriodId, now: Timestamp) -> Result<Vec<Amount>> {
        self.ensure_caller(caller)?;
        self.periods
            .sweep_unclaimed(&mut self.ledger, caller, period, now)
    }
}

#[cfg(test)]
mod tests {
    use openledger_types::DistributionSchedule;
    use rust_decimal::Decimal;

    use super::*;
    use crate::collaborators::{AllowAll, FixedEntitlements};

    const A: AssetId = AssetId([1u8; 32]);

    fn admin() -> Address {
        Address::from_low_u64(1)
    }

    fn engine() -> DistributionEngine {
        DistributionEngine::new(
            EngineConfig::with_admin(admin()),
            Box::new(AllowAll),
            Box::new(FixedEntitlements::new()),
        )
        .unwrap()
    }

    #[test]
    fn invalid_config_rejected() {
        let err = DistributionEngine::new(
            EngineConfig::with_admin(Address::ZERO),
            Box::new(AllowAll),
            Box::new(FixedEntitlements::new()),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
    }

    #[test]
    fn only_admin_mints_and_registers() {
        let mut e = engine();
        let user = Address::from_low_u64(5);
        let err = e.mint(user, user, A, 1, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        let err = e.register_asset(user, A, AssetKind::NonFungible).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));

        e.register_asset(admin(), A, AssetKind::NonFungible).unwrap();
        e.mint(admin(), user, A, 1, &[]).unwrap();
        assert_eq!(e.owner_of(A), Some(user));
    }

    #[test]
    fn native_cannot_be_minted_or_registered() {
        let mut e = engine();
        let err = e.mint(admin(), admin(), AssetId::NATIVE, 1, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAsset { .. }));
        let err = e
            .register_asset(admin(), AssetId::NATIVE, AssetKind::Fungible)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAsset { .. }));
    }

    #[test]
    fn custody_is_sealed() {
        let mut e = engine();
        let custody = e.custody();
        let user = Address::from_low_u64(5);
        e.mint(admin(), user, A, 10, &[]).unwrap();

        let err = e.transfer(custody, custody, user, A, 1, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        let err = e.transfer(user, user, custody, A, 1, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecipient));
        let err = e.mint(admin(), custody, A, 1, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecipient));
        let err = e
            .register_receiver(user, custody, Box::new(openledger_ledger::AcceptAll))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        let req = DisbursementRequest::new(DistributionSchedule::payout_at(Timestamp(10)), vec![A], vec![5])
            .with_clawback_beneficiary(custody);
        let err = e.disburse(user, req, 0, Timestamp(1)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecipient));
        assert_eq!(e.balance_of(A, user), 10);
        assert!(!e.can_claim(PeriodId(1), custody, Timestamp(1)));
    }

    #[test]
    fn receiver_hooks_are_self_declared() {
        let mut e = engine();
        let victim = Address::from_low_u64(5);
        let stranger = Address::from_low_u64(6);
        e.mint(admin(), stranger, A, 10, &[]).unwrap();

        let err = e
            .register_receiver(stranger, victim, Box::new(openledger_ledger::RejectAll))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        e.transfer(stranger, stranger, victim, A, 1, &[]).unwrap();

        e.register_receiver(victim, victim, Box::new(openledger_ledger::RejectAll))
            .unwrap();
        let err = e.transfer(stranger, stranger, victim, A, 1, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::ReceiverRejected(_)));

        let err = e.unregister_receiver(stranger, victim).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert!(e.unregister_receiver(victim, victim).unwrap());
        assert!(!e.unregister_receiver(victim, victim).unwrap());
        e.transfer(stranger, stranger, victim, A, 1, &[]).unwrap();
        assert_eq!(e.balance_of(A, victim), 2);
    }

    #[test]
    fn invariants_hold_through_a_period() {
        let mut e = DistributionEngine::new(
            EngineConfig::with_admin(admin()),
            Box::new(AllowAll),
            Box::new(FixedEntitlements::new().with(Address::from_low_u64(9), Decimal::new(5, 1))),
        )
        .unwrap();
        let principal = Address::from_low_u64(2);
        e.mint(admin(), principal, A, 100, &[]).unwrap();
        let req = DisbursementRequest::new(
            DistributionSchedule::payout_at(Timestamp(10)).with_clawback_date(Timestamp(20)),
            vec![A, AssetId::NATIVE],
            vec![100, 8],
        );
        let id = e.disburse(principal, req, 8, Timestamp(1)).unwrap();
        e.verify_invariants().unwrap();

        e.claim(Address::from_low_u64(9), id, Timestamp(10)).unwrap();
        assert_eq!(e.balance_of(AssetId::NATIVE, Address::from_low_u64(9)), 4);
        assert_eq!(e.earnings_owed_native(id, Address::from_low_u64(9)).unwrap(), 0);
        e.verify_invariants().unwrap();

        e.sweep_unclaimed(principal, id, Timestamp(20)).unwrap();
        e.verify_invariants().unwrap();
        assert_eq!(e.balance_of(A, e.custody()), 0);
        assert_eq!(e.balance_of(AssetId::NATIVE, principal), 4);
    }
}
