//! End-to-end integration tests across the ledger and distribution planes.
//!
//! These tests drive the public [`DistributionEngine`] facade through full
//! period lifecycles: funding, payout, claims, clawback and close. Every
//! scenario finishes by checking supply conservation and that custody holds
//! exactly what open periods still owe.

use std::sync::{Arc, Mutex};

use openledger_distribution::{AllowAll, AllowList, DistributionEngine, FixedEntitlements};
use openledger_ledger::{AcceptAll, AcceptanceMarker, RejectAll, TokenReceiver};
use openledger_types::*;
use rust_decimal::Decimal;

const T: u64 = 1_000;
const C: u64 = 2_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ts(n: u64) -> Timestamp {
    Timestamp(n)
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Helper: one engine with an admin, a principal and two claimants X and Y.
struct Harness {
    engine: DistributionEngine,
    admin: Address,
    principal: Address,
    x: Address,
    y: Address,
    asset: AssetId,
}

impl Harness {
    fn new() -> Self {
        Self::with_authorizer(Box::new(AllowAll))
    }

    fn with_authorizer(authorizer: Box<dyn openledger_distribution::ClaimAuthorizer>) -> Self {
        init_tracing();
        let admin = Address::derive("admin");
        let principal = Address::derive("principal");
        let x = Address::derive("claimant-x");
        let y = Address::derive("claimant-y");
        let shares = FixedEntitlements::new().with(x, dec("0.6")).with(y, dec("0.4"));
        let mut engine = DistributionEngine::new(EngineConfig::with_admin(admin), authorizer, Box::new(shares))
            .expect("valid config");
        let asset = AssetId::from_u128(0xA);
        engine.mint(admin, principal, asset, 10_000, &[]).unwrap();
        Self {
            engine,
            admin,
            principal,
            x,
            y,
            asset,
        }
    }

    /// Declare `allocation` of the harness asset, payout at T, clawback at C.
    fn declare(&mut self, allocation: Amount) -> PeriodId {
        let request = DisbursementRequest::new(
            DistributionSchedule::payout_at(ts(T)).with_clawback_date(ts(C)),
            vec![self.asset],
            vec![allocation],
        );
        self.engine
            .disburse(self.principal, request, 0, ts(1))
            .expect("funded disbursement")
    }

    fn check(&self) {
        self.engine.verify_invariants().unwrap();
    }
}

// =============================================================================
// Test: 60 / 40 split, claim once
// =============================================================================
#[test]
fn e2e_proportional_claims() {
    let mut h = Harness::new();
    let period = h.declare(100);

    // Before the payout date nobody can claim.
    assert!(!h.engine.can_claim(period, h.x, ts(T - 1)));
    assert!(!h.engine.can_claim(period, h.y, ts(T - 1)));
    let err = h.engine.claim(h.x, period, ts(T - 1)).unwrap_err();
    assert!(matches!(err, LedgerError::NotEligible { .. }));

    // At the payout date X is owed 60 and claims it.
    assert!(h.engine.can_claim(period, h.x, ts(T)));
    let (assets, owed) = h.engine.earnings_owed(period, h.x).unwrap();
    assert_eq!((assets, owed), (vec![h.asset], vec![60]));
    let record = h.engine.claim(h.x, period, ts(T)).unwrap();
    assert_eq!(record.amounts, vec![60]);
    assert_eq!(h.engine.balance_of(h.asset, h.x), 60);

    // A second claim fails and moves nothing.
    let err = h.engine.claim(h.x, period, ts(T + 1)).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyClaimed { .. }));
    assert_eq!(h.engine.balance_of(h.asset, h.x), 60);

    assert_eq!(h.engine.earnings_owed(period, h.y).unwrap().1, vec![40]);
    h.check();
}

// =============================================================================
// Test: clawback sweep exactly once
// =============================================================================
#[test]
fn e2e_clawback_sweep() {
    let mut h = Harness::new();
    let treasury = Address::derive("treasury");
    let request = DisbursementRequest::new(
        DistributionSchedule::payout_at(ts(T)).with_clawback_date(ts(C)),
        vec![h.asset],
        vec![100],
    )
    .with_clawback_beneficiary(treasury);
    let period = h.engine.disburse(h.principal, request, 0, ts(1)).unwrap();
    h.engine.claim(h.x, period, ts(T)).unwrap();

    // Before C the 40 residual stays put.
    let err = h.engine.sweep_unclaimed(h.principal, period, ts(C - 1)).unwrap_err();
    assert!(matches!(err, LedgerError::ClawbackNotOpen(_)));
    assert_eq!(h.engine.phase(period, ts(C - 1)).unwrap(), PeriodPhase::PayoutOpen);

    // Only the principal sweeps.
    let err = h.engine.sweep_unclaimed(h.x, period, ts(C)).unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));

    assert_eq!(h.engine.phase(period, ts(C)).unwrap(), PeriodPhase::ClawbackOpen);
    let swept = h.engine.sweep_unclaimed(h.principal, period, ts(C)).unwrap();
    assert_eq!(swept, vec![40]);
    assert_eq!(h.engine.balance_of(h.asset, treasury), 40);
    assert_eq!(h.engine.phase(period, ts(C)).unwrap(), PeriodPhase::Closed);

    // Exactly once.
    let err = h.engine.sweep_unclaimed(h.principal, period, ts(C + 1)).unwrap_err();
    assert!(matches!(err, LedgerError::PeriodClosed(_)));

    // Y missed the window.
    let err = h.engine.claim(h.y, period, ts(C + 1)).unwrap_err();
    assert!(matches!(err, LedgerError::PeriodClosed(_)));
    h.check();
}

// =============================================================================
// Test: underfunded declarations leave nothing behind
// =============================================================================
#[test]
fn e2e_insufficient_funding() {
    let mut h = Harness::new();
    let events = h.engine.events().len();
    let request = DisbursementRequest::new(
        DistributionSchedule::payout_at(ts(T)),
        vec![h.asset],
        vec![10_001],
    );
    let err = h.engine.disburse(h.principal, request, 0, ts(1)).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunding { .. }));
    assert!(h.engine.latest_period().is_none());
    assert_eq!(h.engine.balance_of(h.asset, h.principal), 10_000);
    assert_eq!(h.engine.events().len(), events);
    h.check();
}

// =============================================================================
// Test: native currency travels with token allocations
// =============================================================================
#[test]
fn e2e_native_funding_and_claim() {
    let mut h = Harness::new();
    let request = DisbursementRequest::new(
        DistributionSchedule::payout_at(ts(T)),
        vec![h.asset, AssetId::NATIVE],
        vec![1_000, 50],
    );
    let period = h.engine.disburse(h.principal, request, 50, ts(1)).unwrap();
    assert_eq!(h.engine.balance_of(AssetId::NATIVE, h.engine.custody()), 50);
    assert_eq!(h.engine.earnings_owed_native(period, h.x).unwrap(), 30);

    h.engine.claim(h.y, period, ts(T)).unwrap();
    assert_eq!(h.engine.balance_of(h.asset, h.y), 400);
    assert_eq!(h.engine.balance_of(AssetId::NATIVE, h.y), 20);
    assert_eq!(h.engine.earnings_owed_native(period, h.y).unwrap(), 0);
    h.engine.verify_supply(AssetId::NATIVE).unwrap();
    h.check();
}

// =============================================================================
// Test: a rejecting beneficiary leaves the claim open
// =============================================================================
#[test]
fn e2e_receiver_rejection_rolls_back_claim() {
    let mut h = Harness::new();
    let period = h.declare(100);
    let vault = Address::derive("vault-contract");
    h.engine.register_receiver(vault, vault, Box::new(RejectAll)).unwrap();
    let digest = h.engine.events().digest();

    let err = h.engine.claim_for(h.x, vault, period, ts(T)).unwrap_err();
    assert!(matches!(err, LedgerError::ReceiverRejected(addr) if addr == vault));
    assert!(h.engine.claim_record(period, h.x).is_none());
    assert_eq!(h.engine.period(period).unwrap().unclaimed, vec![100]);
    assert_eq!(h.engine.events().digest(), digest);

    h.engine.claim(h.x, period, ts(T)).unwrap();
    h.check();
}

/// Records the sender and value of every single transfer it accepts.
struct Witness {
    seen: Arc<Mutex<Vec<(Address, Amount)>>>,
}

impl TokenReceiver for Witness {
    fn on_receive(&self, _: Address, from: Address, _: AssetId, value: Amount, _: &[u8]) -> AcceptanceMarker {
        self.seen.lock().unwrap().push((from, value));
        AcceptanceMarker::SINGLE
    }
}

// =============================================================================
// Test: receivers see value coming from custody, accepted claims stick
// =============================================================================
#[test]
fn e2e_accepting_receiver_gets_claim() {
    let mut h = Harness::new();
    let period = h.declare(100);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let vault = Address::derive("vault");
    h.engine
        .register_receiver(vault, vault, Box::new(Witness { seen: Arc::clone(&seen) }))
        .unwrap();

    let record = h.engine.claim_for(h.y, vault, period, ts(T)).unwrap();
    assert_eq!(record.beneficiary, vault);
    assert_eq!(*seen.lock().unwrap(), vec![(h.engine.custody(), 40)]);
    assert_eq!(h.engine.balance_of(h.asset, vault), 40);

    let settled = h
        .engine
        .events()
        .entries()
        .iter()
        .filter(|r| matches!(&r.event, LedgerEvent::ClaimSettled { claimer, beneficiary, .. } if *claimer == h.y && *beneficiary == vault))
        .count();
    assert_eq!(settled, 1);
    h.check();
}

// =============================================================================
// Test: eligibility oracle gates claims but not owed amounts
// =============================================================================
#[test]
fn e2e_authorizer_gate() {
    let y = Address::derive("claimant-y");
    let mut h = Harness::with_authorizer(Box::new(AllowList::new().with(y)));
    let period = h.declare(100);

    assert!(!h.engine.can_claim(period, h.x, ts(T)));
    assert_eq!(h.engine.earnings_owed(period, h.x).unwrap().1, vec![60]);
    let err = h.engine.claim(h.x, period, ts(T)).unwrap_err();
    assert!(matches!(err, LedgerError::NotEligible { .. }));

    h.engine.claim(h.y, period, ts(T)).unwrap();
    h.check();
}

// =============================================================================
// Test: periods are independent
// =============================================================================
#[test]
fn e2e_multiple_periods() {
    let mut h = Harness::new();
    let first = h.declare(100);
    let second = h.declare(1_000);
    assert_eq!(h.engine.latest_period().unwrap().id, second);

    h.engine.claim(h.x, first, ts(T)).unwrap();
    assert!(h.engine.claim_record(second, h.x).is_none());
    h.engine.claim(h.x, second, ts(T)).unwrap();
    assert_eq!(h.engine.balance_of(h.asset, h.x), 660);

    h.engine.sweep_unclaimed(h.principal, first, ts(C)).unwrap();
    assert_eq!(h.engine.phase(second, ts(C)).unwrap(), PeriodPhase::ClawbackOpen);
    h.engine.claim(h.y, second, ts(C)).unwrap();
    assert_eq!(h.engine.balance_of(h.asset, h.y), 400);
    h.check();
}

// =============================================================================
// Test: every date lands in the started event
// =============================================================================
#[test]
fn e2e_period_started_event_carries_dates() {
    let mut h = Harness::new();
    let request = DisbursementRequest::new(
        DistributionSchedule::payout_at(ts(T))
            .with_ex_date(ts(500))
            .with_record_date(ts(600)),
        vec![h.asset],
        vec![10],
    );
    let cursor = h.engine.events().len() as u64;
    let period = h.engine.disburse(h.principal, request, 0, ts(1)).unwrap();

    let started = h
        .engine
        .events()
        .since(cursor)
        .iter()
        .find_map(|r| match &r.event {
            LedgerEvent::DistributionPeriodStarted {
                period: p,
                ex_date,
                record_date,
                payout_date,
                clawback_date,
                ..
            } if *p == period => Some((*ex_date, *record_date, *payout_date, *clawback_date)),
            _ => None,
        })
        .expect("started event");
    assert_eq!(started, (ts(500), ts(600), ts(T), Timestamp::NONE));

    // The started event serializes for indexers.
    let json = serde_json::to_string(&h.engine.events().since(cursor)).unwrap();
    assert!(json.contains("distribution_period_started"));
}

// =============================================================================
// Test: ledger traffic around a live period keeps custody exact
// =============================================================================
#[test]
fn e2e_ledger_traffic_keeps_custody_exact() {
    let mut h = Harness::new();
    let period = h.declare(1_000);
    let bob = Address::derive("bob");

    h.engine
        .batch_transfer(h.principal, h.principal, bob, &[h.asset, h.asset], &[10, 20], &[])
        .unwrap();
    h.engine.approve(bob, h.x, h.asset, 0, 30).unwrap();
    h.engine.transfer(h.x, bob, h.x, h.asset, 30, &[]).unwrap();
    h.engine.register_receiver(bob, bob, Box::new(AcceptAll)).unwrap();
    assert!(h.engine.burn(h.admin, h.principal, h.asset, 1).is_err());
    h.engine.burn(h.principal, h.principal, h.asset, 9).unwrap();

    h.engine.claim(h.x, period, ts(T)).unwrap();
    assert_eq!(h.engine.balance_of(h.asset, h.x), 630);
    assert_eq!(h.engine.total_supply(h.asset), 10_000 - 9);
    h.check();
}

// =============================================================================
// Test: randomized shares never over-pay a period
// =============================================================================
#[test]
fn e2e_randomized_shares_conserve_custody() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    init_tracing();
    let mut rng = StdRng::seed_from_u64(7);
    let admin = Address::derive("admin");
    let principal = Address::derive("principal");
    let asset = AssetId::from_u128(0xB);

    // Twenty claimants with random shares in thousandths, capped so the
    // total never exceeds one.
    let mut shares = FixedEntitlements::new();
    let mut claimants = Vec::new();
    let mut budget: i64 = 1_000;
    for _ in 0..20 {
        let claimant = Address::random();
        let share = rng.gen_range(0..=budget.min(120));
        budget -= share;
        shares.set(claimant, Decimal::new(share, 3));
        claimants.push(claimant);
    }

    let mut engine =
        DistributionEngine::new(EngineConfig::with_admin(admin), Box::new(AllowAll), Box::new(shares)).unwrap();
    engine.mint(admin, principal, asset, 1_000_003, &[]).unwrap();
    let request = DisbursementRequest::new(
        DistributionSchedule::payout_at(ts(T)).with_clawback_date(ts(C)),
        vec![asset],
        vec![1_000_003],
    );
    let period = engine.disburse(principal, request, 0, ts(1)).unwrap();

    let mut paid: Amount = 0;
    for claimant in &claimants {
        let owed = engine.earnings_owed(period, *claimant).unwrap().1[0];
        engine.claim(*claimant, period, ts(rng.gen_range(T..C + 10))).unwrap();
        assert_eq!(engine.balance_of(asset, *claimant), owed);
        paid += owed;
        engine.verify_invariants().unwrap();
    }

    let swept = engine.sweep_unclaimed(principal, period, ts(C + 10)).unwrap();
    assert_eq!(paid + swept[0], 1_000_003);
    assert_eq!(engine.balance_of(asset, engine.custody()), 0);
    engine.verify_invariants().unwrap();
}

// =============================================================================
// Test: only the owner of an address can hook it
// =============================================================================
#[test]
fn e2e_foreign_hook_cannot_block_claim() {
    let mut h = Harness::new();
    let period = h.declare(100);
    let stranger = Address::derive("stranger");

    let err = h
        .engine
        .register_receiver(stranger, h.x, Box::new(RejectAll))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));
    let err = h.engine.unregister_receiver(stranger, h.x).unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));

    let record = h.engine.claim(h.x, period, ts(T)).unwrap();
    assert_eq!(record.amounts, vec![60]);
    assert_eq!(h.engine.balance_of(h.asset, h.x), 60);

    // Y hooks itself, then changes its mind.
    h.engine.register_receiver(h.y, h.y, Box::new(RejectAll)).unwrap();
    let err = h.engine.claim(h.y, period, ts(T)).unwrap_err();
    assert!(matches!(err, LedgerError::ReceiverRejected(addr) if addr == h.y));
    assert!(h.engine.unregister_receiver(h.y, h.y).unwrap());
    h.engine.claim(h.y, period, ts(T)).unwrap();
    assert_eq!(h.engine.balance_of(h.asset, h.y), 40);
    h.check();
}
