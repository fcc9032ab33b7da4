#![cfg(test)]
extern crate std;

use super::*;
use soroban_sdk::{
    testutils::{Address as _, Events as _},
    token::{StellarAssetClient, TokenClient},
    xdr, Address, Env, Event,
};

// -------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------

struct Setup<'a> {
    ledger: StakeLedgerClient<'a>,
    ledger_id: Address,
    admin: Address,
    match_system: Address,
    treasury: Address,
    coordinator: Address,
    token_addr: Address,
    token_sac: StellarAssetClient<'a>,
}

fn create_token<'a>(env: &'a Env, admin: &Address) -> (Address, StellarAssetClient<'a>) {
    let contract = env.register_stellar_asset_contract_v2(admin.clone());
    let client = StellarAssetClient::new(env, &contract.address());
    (contract.address(), client)
}

/// Events the ledger published during the most recent top-level call.
fn ledger_events(env: &Env, ledger_id: &Address) -> std::vec::Vec<xdr::ContractEvent> {
    env.events()
        .all()
        .filter_by_contract(ledger_id)
        .events()
        .to_vec()
}

/// The coordinator is a plain generated address here so tests can drive
/// `advance_round` directly; the real coordinator is exercised in the
/// round-coordinator crate.
fn setup(env: &Env) -> Setup<'_> {
    let admin = Address::generate(env);
    let match_system = Address::generate(env);
    let treasury = Address::generate(env);
    let coordinator = Address::generate(env);
    let token_admin = Address::generate(env);

    let (token_addr, token_sac) = create_token(env, &token_admin);

    let ledger_id = env.register(StakeLedger, ());
    let ledger = StakeLedgerClient::new(env, &ledger_id);

    env.mock_all_auths();
    ledger.init(&admin, &token_addr, &match_system, &treasury, &coordinator);

    Setup {
        ledger,
        ledger_id,
        admin,
        match_system,
        treasury,
        coordinator,
        token_addr,
        token_sac,
    }
}

fn tc<'a>(env: &'a Env, token: &Address) -> TokenClient<'a> {
    TokenClient::new(env, token)
}

/// Stake the ledger holds in custody for `amount` of risk.
fn fund_ledger(s: &Setup, amount: i128) {
    s.token_sac.mint(&s.ledger_id, &amount);
}

// -------------------------------------------------------------------
// 1. Initialization
// -------------------------------------------------------------------

#[test]
fn test_init_rejects_reinit() {
    let env = Env::default();
    let s = setup(&env);

    let result = s.ledger.try_init(
        &s.admin,
        &s.token_addr,
        &s.match_system,
        &s.treasury,
        &s.coordinator,
    );
    assert_eq!(result, Err(Ok(Error::AlreadyInitialized)));
}

#[test]
fn test_ledger_state_before_init_rejected() {
    let env = Env::default();
    let ledger_id = env.register(StakeLedger, ());
    let ledger = StakeLedgerClient::new(&env, &ledger_id);

    assert_eq!(ledger.try_ledger_state(), Err(Ok(Error::NotInitialized)));
    assert_eq!(ledger.current_round(), 0);
}

#[test]
fn test_mutators_before_init_rejected() {
    let env = Env::default();
    env.mock_all_auths();
    let ledger_id = env.register(StakeLedger, ());
    let ledger = StakeLedgerClient::new(&env, &ledger_id);
    let caller = Address::generate(&env);
    let owner = Address::generate(&env);

    assert_eq!(
        ledger.try_increase_risk(&caller, &10, &1u64, &owner),
        Err(Ok(Error::NotInitialized))
    );
    assert_eq!(
        ledger.try_advance_round(&caller, &1u32),
        Err(Ok(Error::NotInitialized))
    );
}

// -------------------------------------------------------------------
// 2. increase_risk
// -------------------------------------------------------------------

#[test]
fn test_increase_risk_updates_entry_total_and_lifetime_loss() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);

    s.ledger.increase_risk(&s.match_system, &100, &7u64, &owner);
    s.ledger.increase_risk(&s.match_system, &25, &7u64, &owner);
    assert_eq!(
        ledger_events(&env, &s.ledger_id),
        std::vec![RiskIncreased {
            round: 0,
            participant_id: 7,
            owner: owner.clone(),
            amount: 25,
            at_risk: 125,
        }
        .to_xdr(&env, &s.ledger_id)]
    );

    assert_eq!(s.ledger.get_at_risk(&7u64), 125);
    assert_eq!(s.ledger.total_at_risk(&0u32), 125);
    assert_eq!(s.ledger.lifetime_loss(&owner), 125);
}

#[test]
fn test_increase_risk_by_outsider_rejected() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    let outsider = Address::generate(&env);

    let result = s.ledger.try_increase_risk(&outsider, &100, &1u64, &owner);
    assert_eq!(result, Err(Ok(Error::NotAuthorized)));
    assert_eq!(s.ledger.total_at_risk(&0u32), 0);
}

#[test]
fn test_increase_risk_non_positive_rejected() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);

    assert_eq!(
        s.ledger.try_increase_risk(&s.match_system, &0, &1u64, &owner),
        Err(Ok(Error::InvalidAmount))
    );
    assert_eq!(
        s.ledger.try_increase_risk(&s.match_system, &-5, &1u64, &owner),
        Err(Ok(Error::InvalidAmount))
    );
}

#[test]
fn test_increase_risk_overflow_rejected() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);

    s.ledger
        .increase_risk(&s.match_system, &i128::MAX, &1u64, &owner);
    let result = s.ledger.try_increase_risk(&s.match_system, &1, &1u64, &owner);
    assert_eq!(result, Err(Ok(Error::Overflow)));
    assert_eq!(s.ledger.get_at_risk(&1u64), i128::MAX);
}

#[test]
fn test_total_matches_sum_of_entries() {
    let env = Env::default();
    let s = setup(&env);
    let owner_a = Address::generate(&env);
    let owner_b = Address::generate(&env);
    fund_ledger(&s, 1_000);

    s.ledger.increase_risk(&s.match_system, &300, &1u64, &owner_a);
    s.ledger.increase_risk(&s.match_system, &200, &2u64, &owner_b);
    s.ledger.increase_risk(&s.match_system, &50, &3u64, &owner_a);
    s.ledger.reclaim(&s.match_system, &120, &1u64, &owner_a);

    let sum = s.ledger.get_at_risk(&1u64) + s.ledger.get_at_risk(&2u64) + s.ledger.get_at_risk(&3u64);
    assert_eq!(sum, 430);
    assert_eq!(s.ledger.total_at_risk(&0u32), sum);
    assert_eq!(s.ledger.lifetime_loss(&owner_a), 230);
    assert_eq!(s.ledger.lifetime_loss(&owner_b), 200);
}

// -------------------------------------------------------------------
// 3. reclaim
// -------------------------------------------------------------------

#[test]
fn test_reclaim_moves_value_to_match_system() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    let token = tc(&env, &s.token_addr);
    fund_ledger(&s, 100);

    s.ledger.increase_risk(&s.match_system, &100, &1u64, &owner);
    s.ledger.reclaim(&s.match_system, &40, &1u64, &owner);

    assert_eq!(s.ledger.get_at_risk(&1u64), 60);
    assert_eq!(s.ledger.total_at_risk(&0u32), 60);
    assert_eq!(s.ledger.lifetime_loss(&owner), 60);
    assert_eq!(token.balance(&s.match_system), 40);
    assert_eq!(token.balance(&s.ledger_id), 60);
}

#[test]
fn test_reclaim_above_balance_fails_without_transfer() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    let token = tc(&env, &s.token_addr);
    fund_ledger(&s, 500);

    s.ledger.increase_risk(&s.match_system, &60, &1u64, &owner);
    let result = s.ledger.try_reclaim(&s.match_system, &61, &1u64, &owner);

    assert_eq!(result, Err(Ok(Error::Underflow)));
    assert_eq!(s.ledger.get_at_risk(&1u64), 60);
    assert_eq!(s.ledger.total_at_risk(&0u32), 60);
    assert_eq!(token.balance(&s.match_system), 0);
}

#[test]
fn test_reclaim_beyond_owner_lifetime_loss_fails() {
    let env = Env::default();
    let s = setup(&env);
    let previous_owner = Address::generate(&env);
    let new_owner = Address::generate(&env);
    fund_ledger(&s, 500);

    // Participant changed hands mid-round; the new owner never lost anything.
    s.ledger
        .increase_risk(&s.match_system, &80, &1u64, &previous_owner);
    let result = s.ledger.try_reclaim(&s.match_system, &30, &1u64, &new_owner);

    assert_eq!(result, Err(Ok(Error::Underflow)));
    assert_eq!(s.ledger.get_at_risk(&1u64), 80);
    assert_eq!(s.ledger.lifetime_loss(&previous_owner), 80);
}

#[test]
fn test_reclaim_failed_transfer_leaves_state_untouched() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);

    // Risk recorded but the ledger never received custody of the stake.
    s.ledger.increase_risk(&s.match_system, &100, &1u64, &owner);
    let result = s.ledger.try_reclaim(&s.match_system, &40, &1u64, &owner);

    assert_eq!(result, Err(Ok(Error::TransferFailed)));
    assert_eq!(s.ledger.get_at_risk(&1u64), 100);
    assert_eq!(s.ledger.total_at_risk(&0u32), 100);
    assert_eq!(s.ledger.lifetime_loss(&owner), 100);
}

#[test]
fn test_reclaim_by_outsider_rejected() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    fund_ledger(&s, 100);

    s.ledger.increase_risk(&s.match_system, &100, &1u64, &owner);
    let result = s.ledger.try_reclaim(&owner, &100, &1u64, &owner);
    assert_eq!(result, Err(Ok(Error::NotAuthorized)));
}

// -------------------------------------------------------------------
// 4. advance_round
// -------------------------------------------------------------------

#[test]
fn test_advance_round_sweeps_to_treasury() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    let token = tc(&env, &s.token_addr);
    fund_ledger(&s, 100);

    s.ledger.increase_risk(&s.match_system, &100, &1u64, &owner);
    s.ledger.reclaim(&s.match_system, &40, &1u64, &owner);
    s.ledger.advance_round(&s.coordinator, &1u32);

    assert_eq!(s.ledger.current_round(), 1);
    assert_eq!(s.ledger.total_at_risk(&0u32), 0);
    assert_eq!(s.ledger.swept_total(&0u32), 60);
    assert_eq!(token.balance(&s.treasury), 60);
    assert_eq!(token.balance(&s.ledger_id), 0);

    // Closed round reports nothing at risk but keeps the forfeiture record.
    assert_eq!(s.ledger.get_at_risk_for_round(&0u32, &1u64), 0);
    assert_eq!(s.ledger.get_forfeited(&0u32, &1u64), 60);
    assert_eq!(s.ledger.get_at_risk(&1u64), 0);
    assert_eq!(s.ledger.lifetime_loss(&owner), 60);
}

#[test]
fn test_advance_round_with_nothing_at_risk() {
    let env = Env::default();
    let s = setup(&env);
    let token = tc(&env, &s.token_addr);

    s.ledger.advance_round(&s.coordinator, &1u32);

    assert_eq!(s.ledger.current_round(), 1);
    assert_eq!(s.ledger.swept_total(&0u32), 0);
    assert_eq!(token.balance(&s.treasury), 0);
}

#[test]
fn test_advance_round_failed_sweep_keeps_round() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    fund_ledger(&s, 30);

    s.ledger.increase_risk(&s.match_system, &100, &1u64, &owner);
    let result = s.ledger.try_advance_round(&s.coordinator, &1u32);

    assert_eq!(result, Err(Ok(Error::TransferFailed)));
    assert_eq!(s.ledger.current_round(), 0);
    assert_eq!(s.ledger.total_at_risk(&0u32), 100);
    assert_eq!(s.ledger.swept_total(&0u32), 0);

    // Once custody is topped up the same advance goes through.
    fund_ledger(&s, 70);
    s.ledger.advance_round(&s.coordinator, &1u32);
    assert_eq!(s.ledger.current_round(), 1);
    assert_eq!(s.ledger.total_at_risk(&0u32), 0);
}

#[test]
fn test_advance_round_out_of_order_rejected() {
    let env = Env::default();
    let s = setup(&env);

    assert_eq!(
        s.ledger.try_advance_round(&s.coordinator, &0u32),
        Err(Ok(Error::RoundOutOfOrder))
    );
    assert_eq!(
        s.ledger.try_advance_round(&s.coordinator, &2u32),
        Err(Ok(Error::RoundOutOfOrder))
    );

    s.ledger.advance_round(&s.coordinator, &1u32);
    assert_eq!(
        s.ledger.try_advance_round(&s.coordinator, &1u32),
        Err(Ok(Error::RoundOutOfOrder))
    );
    assert_eq!(s.ledger.current_round(), 1);
}

#[test]
fn test_advance_round_by_non_coordinator_rejected() {
    let env = Env::default();
    let s = setup(&env);

    assert_eq!(
        s.ledger.try_advance_round(&s.admin, &1u32),
        Err(Ok(Error::NotAuthorized))
    );
    assert_eq!(
        s.ledger.try_advance_round(&s.match_system, &1u32),
        Err(Ok(Error::NotAuthorized))
    );
    assert_eq!(s.ledger.current_round(), 0);
}

#[test]
fn test_new_round_starts_from_zero() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    fund_ledger(&s, 200);

    s.ledger.increase_risk(&s.match_system, &100, &1u64, &owner);
    s.ledger.advance_round(&s.coordinator, &1u32);
    s.ledger.increase_risk(&s.match_system, &30, &1u64, &owner);

    assert_eq!(s.ledger.get_at_risk(&1u64), 30);
    assert_eq!(s.ledger.total_at_risk(&1u32), 30);
    assert_eq!(s.ledger.get_forfeited(&0u32, &1u64), 100);
    assert_eq!(s.ledger.lifetime_loss(&owner), 130);

    // Reclaim only reaches the open round's balance.
    assert_eq!(
        s.ledger.try_reclaim(&s.match_system, &31, &1u64, &owner),
        Err(Ok(Error::Underflow))
    );
}

#[test]
fn test_forfeited_for_open_round_rejected() {
    let env = Env::default();
    let s = setup(&env);

    assert_eq!(
        s.ledger.try_get_forfeited(&0u32, &1u64),
        Err(Ok(Error::RoundNotClosed))
    );
}

// -------------------------------------------------------------------
// 5. Configuration
// -------------------------------------------------------------------

#[test]
fn test_update_config_replaces_match_system() {
    let env = Env::default();
    let s = setup(&env);
    let owner = Address::generate(&env);
    let new_match_system = Address::generate(&env);

    s.ledger
        .update_config(&s.admin, &ConfigUpdate::SetMatchSystem(new_match_system.clone()));

    assert_eq!(
        s.ledger.try_increase_risk(&s.match_system, &10, &1u64, &owner),
        Err(Ok(Error::NotAuthorized))
    );
    s.ledger.increase_risk(&new_match_system, &10, &1u64, &owner);
    assert_eq!(s.ledger.ledger_state().match_system, new_match_system);
}

#[test]
fn test_update_config_transfer_admin_and_treasury() {
    let env = Env::default();
    let s = setup(&env);
    let new_admin = Address::generate(&env);
    let new_treasury = Address::generate(&env);

    s.ledger
        .update_config(&s.admin, &ConfigUpdate::TransferAdmin(new_admin.clone()));
    assert_eq!(
        s.ledger
            .try_update_config(&s.admin, &ConfigUpdate::SetTreasury(new_treasury.clone())),
        Err(Ok(Error::NotAuthorized))
    );

    s.ledger
        .update_config(&new_admin, &ConfigUpdate::SetTreasury(new_treasury.clone()));
    let state = s.ledger.ledger_state();
    assert_eq!(state.admin, new_admin);
    assert_eq!(state.treasury, new_treasury);
}

#[test]
fn test_update_config_by_outsider_rejected() {
    let env = Env::default();
    let s = setup(&env);
    let outsider = Address::generate(&env);

    let result = s
        .ledger
        .try_update_config(&outsider, &ConfigUpdate::TransferAdmin(outsider.clone()));
    assert_eq!(result, Err(Ok(Error::NotAuthorized)));
    assert_eq!(s.ledger.ledger_state().admin, s.admin);
}
