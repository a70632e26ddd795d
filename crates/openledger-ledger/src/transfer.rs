//! Transfer engine: the only writer of balances and allowances.
//!
//! Every mutating operation runs in four steps:
//!
//! 1. **Validate** shapes (arity, batch size, recipient)
//! 2. **Authorize** the operator (owner, operator grant, or allowance) and
//!    check balances against the per-asset totals of the whole call
//! 3. **Apply** debits, credits, allowance draws and events, journaling each
//! 4. **Notify** the recipient if it declared itself a receiver
//!
//! If anything fails after step 3 began, including a receiver answering with
//! the wrong marker, the journal is replayed backwards: balances, allowances,
//! supply counters and events end up exactly as before the call.
//!
//! Guard state (debits, allowance draws) is committed before the receiver
//! hook runs.
//!
//! [`TransferEngine::atomic`] widens the same guarantee to a sequence of
//! operations: the distribution plane funds periods, pays claims and sweeps
//! residuals inside one scope, so a late failure unwinds the earlier steps.

use std::collections::BTreeMap;

use openledger_types::{
    Address, Amount, AssetId, AssetKind, EngineConfig, EventRecord, LedgerError, LedgerEvent,
    Result,
};

use crate::approvals::ApprovalManager;
use crate::event_log::EventLog;
use crate::ledger_store::LedgerStore;
use crate::receiver::{AcceptanceMarker, ReceiverRegistry, TokenReceiver};
use crate::supply_conservation::SupplyConservation;

/// Which receiver hook a transfer dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Single,
    Batch,
}

/// One applied step, with enough information to reverse it.
#[derive(Debug)]
enum Undo {
    Moved {
        asset: AssetId,
        from: Address,
        to: Address,
        value: Amount,
    },
    Minted {
        asset: AssetId,
        to: Address,
        value: Amount,
    },
    Burned {
        asset: AssetId,
        from: Address,
        value: Amount,
    },
    AllowanceSpent {
        owner: Address,
        spender: Address,
        asset: AssetId,
        amount: Amount,
    },
}

/// Undo log for one operation.
#[derive(Debug)]
struct Journal {
    steps: Vec<Undo>,
    events_len: usize,
}

impl Journal {
    fn begin(events: &EventLog) -> Self {
        Self {
            steps: Vec::new(),
            events_len: events.len(),
        }
    }
}

/// Executes transfers, mints, burns and approvals against the ledger.
///
/// Owns the [`LedgerStore`], [`ApprovalManager`], receiver registry, event
/// log and supply tracker. Callers above it (the engine facade) are
/// responsible for deciding *who* may call *what*; this type enforces the
/// ledger rules.
#[derive(Debug)]
pub struct TransferEngine {
    store: LedgerStore,
    approvals: ApprovalManager,
    receivers: ReceiverRegistry,
    events: EventLog,
    supply: SupplyConservation,
    /// Open `atomic` scopes, innermost last.
    scopes: Vec<Journal>,
    /// The engine's own account.
    custody: Address,
    max_batch_size: usize,
}

impl TransferEngine {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            store: LedgerStore::new(),
            approvals: ApprovalManager::new(),
            receivers: ReceiverRegistry::new(),
            events: EventLog::new(),
            supply: SupplyConservation::new(),
            scopes: Vec::new(),
            custody: config.custody,
            max_batch_size: config.max_batch_size,
        }
    }

    // -----------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------

    #[must_use]
    pub fn custody(&self) -> Address {
        self.custody
    }

    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    #[must_use]
    pub fn balance_of(&self, asset: AssetId, owner: Address) -> Amount {
        self.store.balance_of(asset, owner)
    }

    pub fn balance_of_batch(&self, owners: &[Address], assets: &[AssetId]) -> Result<Vec<Amount>> {
        self.store.balance_of_batch(owners, assets)
    }

    #[must_use]
    pub fn allowance(&self, owner: Address, spender: Address, asset: AssetId) -> Amount {
        self.approvals.allowance(owner, spender, asset)
    }

    #[must_use]
    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.approvals.is_approved_for_all(owner, operator)
    }

    #[must_use]
    pub fn total_supply(&self, asset: AssetId) -> Amount {
        self.store.total_supply(asset)
    }

    #[must_use]
    pub fn kind_of(&self, asset: AssetId) -> AssetKind {
        self.store.kind_of(asset)
    }

    #[must_use]
    pub fn owner_of(&self, asset: AssetId) -> Option<Address> {
        self.store.owner_of(asset)
    }

    #[must_use]
    pub fn is_receiver(&self, address: &Address) -> bool {
        self.receivers.is_receiver(address)
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    #[must_use]
    pub fn supply(&self) -> &SupplyConservation {
        &self.supply
    }

    /// Whether minting `amount` of `asset` to `to` would overflow neither the
    /// balance nor the running mint total.
    #[must_use]
    pub fn can_mint(&self, to: Address, asset: AssetId, amount: Amount) -> bool {
        self.store.can_credit(asset, to, amount)
            && self.supply.total_minted(asset).checked_add(amount).is_some()
    }

    /// Verify Σ balances == minted − burned for one asset.
    pub fn verify_supply(&self, asset: AssetId) -> Result<()> {
        self.supply.verify(asset, self.store.recount_supply(asset))
    }

    /// Verify supply conservation for every asset ever minted or burned.
    pub fn verify_all_supply(&self) -> Result<()> {
        for asset in self.supply.tracked_assets() {
            self.verify_supply(asset)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Registry and approvals
    // -----------------------------------------------------------------

    /// Tag an asset with an explicit kind.
    pub fn register_asset(&mut self, asset: AssetId, kind: AssetKind) -> Result<()> {
        self.store.register(asset, kind)?;
        self.events.append(LedgerEvent::AssetRegistered { asset, kind })?;
        tracing::info!(%asset, %kind, "Asset registered");
        Ok(())
    }

    /// Declare `address` a receiver: every transfer to it will call `receiver`.
    pub fn register_receiver(&mut self, address: Address, receiver: Box<dyn TokenReceiver>) {
        tracing::debug!(%address, "Receiver registered");
        self.receivers.register(address, receiver);
    }

    /// Remove `address`'s hook. Returns whether one was registered.
    pub fn unregister_receiver(&mut self, address: Address) -> bool {
        let removed = self.receivers.unregister(&address);
        if removed {
            tracing::debug!(%address, "Receiver unregistered");
        }
        removed
    }

    /// Compare-and-swap an allowance on behalf of `owner`.
    ///
    /// Emits [`LedgerEvent::ApprovalChanged`] on every success, even when the
    /// value did not change.
    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        asset: AssetId,
        expected_current: Amount,
        new_value: Amount,
    ) -> Result<()> {
        let previous = self
            .approvals
            .approve(owner, spender, asset, expected_current, new_value)?;
        let event = LedgerEvent::ApprovalChanged {
            owner,
            spender,
            asset,
            previous,
            current: new_value,
        };
        if let Err(err) = self.events.append(event) {
            self.approvals.restore_exact(owner, spender, asset, previous);
            return Err(err);
        }
        tracing::debug!(%owner, %spender, %asset, previous, current = new_value, "Allowance set");
        Ok(())
    }

    /// Grant or revoke blanket operator status on behalf of `owner`.
    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) -> Result<()> {
        let was = self.approvals.is_approved_for_all(owner, operator);
        self.approvals.set_approval_for_all(owner, operator, approved)?;
        let event = LedgerEvent::OperatorApprovalChanged {
            owner,
            operator,
            approved,
        };
        if let Err(err) = self.events.append(event) {
            self.approvals.set_approval_for_all(owner, operator, was)?;
            return Err(err);
        }
        tracing::debug!(%owner, %operator, approved, "Operator approval set");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------

    /// Move `value` of `asset` from `from` to `to`, acting as `operator`.
    ///
    /// # Errors
    /// - `InvalidRecipient` if `to` is zero
    /// - `InsufficientAllowance` if `operator` is neither owner, operator,
    ///   nor holds enough allowance
    /// - `InsufficientBalance` if `from` can't cover `value`
    /// - `ReceiverRejected` if `to`'s hook declines (nothing changes)
    pub fn transfer(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        asset: AssetId,
        value: Amount,
        data: &[u8],
    ) -> Result<()> {
        self.execute(operator, from, to, &[asset], &[value], data, Dispatch::Single)
    }

    /// Move several (asset, value) pairs from `from` to `to` all-or-nothing.
    ///
    /// Duplicate assets are allowed; balance and allowance checks use the
    /// per-asset total. Emits one transfer event per pair, in order.
    ///
    /// # Errors
    /// As [`TransferEngine::transfer`], plus `ArityMismatch` for unequal
    /// slices and `BatchTooLarge` above the configured maximum. A failed batch
    /// changes nothing.
    pub fn batch_transfer(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        assets: &[AssetId],
        values: &[Amount],
        data: &[u8],
    ) -> Result<()> {
        self.execute(operator, from, to, assets, values, data, Dispatch::Batch)
    }

    /// Create `amount` of `asset` out of nothing and credit it to `to`.
    ///
    /// # Errors
    /// - `InvalidRecipient` if `to` is zero
    /// - `NonFungibleSupply` for a second unit (or amount ≠ 1) of a
    ///   non-fungible asset
    /// - `Overflow` if the balance or the mint total would overflow
    /// - `ReceiverRejected` if `to`'s hook declines
    pub fn mint(
        &mut self,
        operator: Address,
        to: Address,
        asset: AssetId,
        amount: Amount,
        data: &[u8],
    ) -> Result<()> {
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        if self.store.kind_of(asset) == AssetKind::NonFungible
            && (amount != 1 || self.store.total_supply(asset) > 0)
        {
            return Err(LedgerError::NonFungibleSupply(asset));
        }
        if !self.store.can_credit(asset, to, amount) {
            return Err(LedgerError::Overflow);
        }

        let mut journal = Journal::begin(&self.events);
        let result = self
            .apply_mint(&mut journal, operator, to, asset, amount)
            .and_then(|()| self.notify(operator, Address::ZERO, to, &[asset], &[amount], data, Dispatch::Single));
        self.finish(journal, result)?;

        tracing::info!(%operator, %to, %asset, amount, "Minted");
        Ok(())
    }

    /// Destroy `amount` of `from`'s `asset`, acting as `operator`.
    ///
    /// # Errors
    /// `InsufficientAllowance` / `InsufficientBalance` as for transfers.
    pub fn burn(&mut self, operator: Address, from: Address, asset: AssetId, amount: Amount) -> Result<()> {
        let spends = self.authorize(operator, from, &[(asset, amount)])?;
        let available = self.store.balance_of(asset, from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                asset,
                needed: amount,
                available,
            });
        }

        let mut journal = Journal::begin(&self.events);
        let result = self.apply_burn(&mut journal, operator, from, asset, amount, &spends);
        self.finish(journal, result)?;

        tracing::info!(%operator, %from, %asset, amount, "Burned");
        Ok(())
    }

    /// Run `f` all-or-nothing.
    ///
    /// Every transfer, mint, burn and event made inside `f` is undone if `f`
    /// returns an error. Scopes nest; an inner scope that succeeds hands its
    /// undo steps to the enclosing one. Allowance and operator changes made
    /// through [`TransferEngine::approve`] and
    /// [`TransferEngine::set_approval_for_all`] are not covered.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(Journal::begin(&self.events));
        let result = f(self);
        let Some(scope) = self.scopes.pop() else {
            return Err(LedgerError::Internal("atomic scope stack underflow".to_string()));
        };
        match result {
            Ok(value) => {
                self.commit(scope);
                Ok(value)
            }
            Err(err) => {
                self.rollback(scope);
                Err(err)
            }
        }
    }

    /// Append a non-transfer event (distribution lifecycle, claims).
    pub fn record_event(&mut self, event: LedgerEvent) -> Result<u64> {
        self.events.append(event)
    }

    /// Events appended at or after `cursor`.
    #[must_use]
    pub fn events_since(&self, cursor: u64) -> &[EventRecord] {
        self.events.since(cursor)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        assets: &[AssetId],
        values: &[Amount],
        data: &[u8],
        dispatch: Dispatch,
    ) -> Result<()> {
        // 1. Shape checks. Nothing touched yet.
        if assets.len() != values.len() {
            return Err(LedgerError::ArityMismatch {
                left: assets.len(),
                right: values.len(),
            });
        }
        if assets.len() > self.max_batch_size {
            return Err(LedgerError::BatchTooLarge {
                len: assets.len(),
                max: self.max_batch_size,
            });
        }
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }

        // 2. Authorization and funds, against per-asset totals.
        let totals = aggregate(assets, values)?;
        let spends = self.authorize(operator, from, &totals)?;
        for &(asset, total) in &totals {
            let available = self.store.balance_of(asset, from);
            if available < total {
                return Err(LedgerError::InsufficientBalance {
                    asset,
                    needed: total,
                    available,
                });
            }
            if from != to && !self.store.can_credit(asset, to, total) {
                return Err(LedgerError::Overflow);
            }
        }

        // 3 + 4. Apply, then let the recipient vet it.
        let mut journal = Journal::begin(&self.events);
        let result = self
            .apply_transfer(&mut journal, operator, from, to, assets, values, &spends)
            .and_then(|()| self.notify(operator, from, to, assets, values, data, dispatch));
        self.finish(journal, result)?;

        tracing::debug!(
            %operator,
            %from,
            %to,
            pairs = assets.len(),
            batch = dispatch == Dispatch::Batch,
            "Transfer applied"
        );
        Ok(())
    }

    /// Allowance draws needed for `operator` to move `totals` out of `from`.
    /// Empty when the operator is the owner or holds operator status.
    fn authorize(
        &self,
        operator: Address,
        from: Address,
        totals: &[(AssetId, Amount)],
    ) -> Result<Vec<(AssetId, Amount)>> {
        if self.approvals.has_blanket_authority(from, operator) {
            return Ok(Vec::new());
        }
        for &(asset, total) in totals {
            self.approvals.check(from, operator, asset, total)?;
        }
        Ok(totals.to_vec())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_transfer(
        &mut self,
        journal: &mut Journal,
        operator: Address,
        from: Address,
        to: Address,
        assets: &[AssetId],
        values: &[Amount],
        spends: &[(AssetId, Amount)],
    ) -> Result<()> {
        for &(asset, amount) in spends {
            self.approvals.consume(from, operator, asset, amount)?;
            journal.steps.push(Undo::AllowanceSpent {
                owner: from,
                spender: operator,
                asset,
                amount,
            });
        }

        for (&asset, &value) in assets.iter().zip(values) {
            self.store.debit(asset, from, value)?;
            if let Err(err) = self.store.credit(asset, to, value) {
                self.store.revert_debit(asset, from, value);
                return Err(err);
            }
            journal.steps.push(Undo::Moved {
                asset,
                from,
                to,
                value,
            });
            self.events.append(LedgerEvent::Transfer {
                operator,
                from,
                to,
                asset,
                value,
            })?;
        }
        Ok(())
    }

    fn apply_mint(
        &mut self,
        journal: &mut Journal,
        operator: Address,
        to: Address,
        asset: AssetId,
        amount: Amount,
    ) -> Result<()> {
        self.store.credit(asset, to, amount)?;
        if let Err(err) = self.supply.record_mint(asset, amount) {
            self.store.revert_credit(asset, to, amount);
            return Err(err);
        }
        journal.steps.push(Undo::Minted {
            asset,
            to,
            value: amount,
        });
        self.events.append(LedgerEvent::Transfer {
            operator,
            from: Address::ZERO,
            to,
            asset,
            value: amount,
        })?;
        Ok(())
    }

    fn apply_burn(
        &mut self,
        journal: &mut Journal,
        operator: Address,
        from: Address,
        asset: AssetId,
        amount: Amount,
        spends: &[(AssetId, Amount)],
    ) -> Result<()> {
        for &(asset, spend) in spends {
            self.approvals.consume(from, operator, asset, spend)?;
            journal.steps.push(Undo::AllowanceSpent {
                owner: from,
                spender: operator,
                asset,
                amount: spend,
            });
        }
        self.store.debit(asset, from, amount)?;
        if let Err(err) = self.supply.record_burn(asset, amount) {
            self.store.revert_debit(asset, from, amount);
            return Err(err);
        }
        journal.steps.push(Undo::Burned {
            asset,
            from,
            value: amount,
        });
        self.events.append(LedgerEvent::Transfer {
            operator,
            from,
            to: Address::ZERO,
            asset,
            value: amount,
        })?;
        Ok(())
    }

    /// Call the recipient's hook, if it has one.
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        operator: Address,
        from: Address,
        to: Address,
        assets: &[AssetId],
        values: &[Amount],
        data: &[u8],
        dispatch: Dispatch,
    ) -> Result<()> {
        let Some(receiver) = self.receivers.get(&to) else {
            return Ok(());
        };

        let (answer, expected) = match (dispatch, assets.first(), values.first()) {
            (Dispatch::Single, Some(&asset), Some(&value)) => (
                receiver.on_receive(operator, from, asset, value, data),
                AcceptanceMarker::SINGLE,
            ),
            _ => (
                receiver.on_batch_receive(operator, from, assets, values, data),
                AcceptanceMarker::BATCH,
            ),
        };

        if answer != expected {
            tracing::warn!(
                receiver = %to,
                %answer,
                %expected,
                "Receiver rejected transfer; rolling back"
            );
            return Err(LedgerError::ReceiverRejected(to));
        }
        Ok(())
    }

    /// Commit or roll back one operation's journal.
    fn finish(&mut self, journal: Journal, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.commit(journal);
                Ok(())
            }
            Err(err) => {
                self.rollback(journal);
                Err(err)
            }
        }
    }

    /// Hand a committed journal to the enclosing `atomic` scope, if any.
    fn commit(&mut self, journal: Journal) {
        if let Some(outer) = self.scopes.last_mut() {
            outer.steps.extend(journal.steps);
        }
    }

    /// Reverse every journaled step, newest first, and drop the events.
    fn rollback(&mut self, journal: Journal) {
        for step in journal.steps.into_iter().rev() {
            match step {
                Undo::Moved {
                    asset,
                    from,
                    to,
                    value,
                } => {
                    self.store.revert_credit(asset, to, value);
                    self.store.revert_debit(asset, from, value);
                }
                Undo::Minted { asset, to, value } => {
                    self.store.revert_credit(asset, to, value);
                    self.supply.revert_mint(asset, value);
                }
                Undo::Burned { asset, from, value } => {
                    self.store.revert_debit(asset, from, value);
                    self.supply.revert_burn(asset, value);
                }
                Undo::AllowanceSpent {
                    owner,
                    spender,
                    asset,
                    amount,
                } => self.approvals.restore(owner, spender, asset, amount),
            }
        }
        self.events.truncate(journal.events_len);
    }
}

/// Per-asset totals of a transfer, in asset ID order.
fn aggregate(assets: &[AssetId], values: &[Amount]) -> Result<Vec<(AssetId, Amount)>> {
    let mut totals: BTreeMap<AssetId, Amount> = BTreeMap::new();
    for (&asset, &value) in assets.iter().zip(values) {
        let total = totals.entry(asset).or_insert(0);
        *total = total.checked_add(value).ok_or(LedgerError::Overflow)?;
    }
    Ok(totals.into_iter().collect())
}
