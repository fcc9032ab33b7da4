//! Arena Stake-At-Risk Ledger Contract
//!
//! Tracks value each participant has placed in jeopardy during the open
//! round. The match-resolution system raises a participant's risk when a
//! match is lost and reclaims it when a later match is won. When the round
//! closes, whatever is still at risk is swept to the treasury.
//!
//! This contract owns the one round counter shared by the arena ledgers. The
//! points ledger and the coordinator read it from here; only the coordinator
//! may move it, and only by sweeping the closing round first.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Token, MatchSystem, Treasury, Coordinator, CurrentRound.
//! - `persistent()`: per-round/per-participant `AtRisk`, per-round `TotalAtRisk`
//!   and `SweptTotal`, per-owner `LifetimeLoss`.
//!
//! ## Invariants
//! - For the open round `r`: `sum(AtRisk(r, *)) == TotalAtRisk(r)`.
//! - For a closed round `r`: `TotalAtRisk(r) == 0` and `SweptTotal(r)` holds
//!   the amount moved to the treasury. `AtRisk(r, p)` is kept as the record
//!   of what `p` forfeited.
//! - `LifetimeLoss(owner)` is what the owner forfeited in closed rounds plus
//!   what is still at risk in the open round.
#![no_std]
#![allow(unexpected_cfgs)]

use arena_shared::{credit, debit, PERSISTENT_BUMP_LEDGERS};
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token::TokenClient,
    Address, Env,
};

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotAuthorized      = 3,
    InvalidAmount      = 4,
    /// A debit would take a balance below zero.
    Underflow          = 5,
    Overflow           = 6,
    /// The token contract rejected a transfer out of the ledger.
    TransferFailed     = 7,
    /// `advance_round` target is not exactly `current_round + 1`.
    RoundOutOfOrder    = 8,
    RoundNotClosed     = 9,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Token,
    MatchSystem,
    Treasury,
    Coordinator,
    CurrentRound,
    // --- persistent() ---
    /// Value at risk for a participant in a round, keyed by (round, participant_id).
    AtRisk(u32, u64),
    /// Aggregate at-risk value for a round.
    TotalAtRisk(u32),
    /// Amount forfeited to the treasury when the round closed.
    SweptTotal(u32),
    LifetimeLoss(Address),
}

/// Admin-gated configuration changes.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigUpdate {
    TransferAdmin(Address),
    SetMatchSystem(Address),
    SetTreasury(Address),
}

/// Snapshot returned by `ledger_state`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LedgerState {
    pub admin: Address,
    pub token: Address,
    pub match_system: Address,
    pub treasury: Address,
    pub coordinator: Address,
    pub current_round: u32,
    pub total_at_risk: i128,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    pub admin: Address,
    pub token: Address,
    pub coordinator: Address,
}

#[contractevent]
pub struct RiskIncreased {
    #[topic]
    pub round: u32,
    #[topic]
    pub participant_id: u64,
    pub owner: Address,
    pub amount: i128,
    pub at_risk: i128,
}

#[contractevent]
pub struct RiskReclaimed {
    #[topic]
    pub round: u32,
    #[topic]
    pub participant_id: u64,
    pub owner: Address,
    pub amount: i128,
    pub at_risk: i128,
}

#[contractevent]
pub struct RoundSwept {
    #[topic]
    pub round: u32,
    pub next_round: u32,
    pub treasury: Address,
    pub amount: i128,
}

#[contractevent]
pub struct ConfigUpdated {
    pub admin: Address,
    pub update: ConfigUpdate,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct StakeLedger;

#[contractimpl]
impl StakeLedger {
    /// Initialize the ledger. May only be called once.
    ///
    /// `token` is the SEP-41 contract holding the staked value. The ledger's
    /// own balance in that token backs everything at risk; the match system
    /// is expected to move stake into the ledger before raising risk.
    pub fn init(
        env: Env,
        admin: Address,
        token: Address,
        match_system: Address,
        treasury: Address,
        coordinator: Address,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage().instance().set(&DataKey::MatchSystem, &match_system);
        env.storage().instance().set(&DataKey::Treasury, &treasury);
        env.storage().instance().set(&DataKey::Coordinator, &coordinator);
        env.storage().instance().set(&DataKey::CurrentRound, &0u32);

        Initialized {
            admin,
            token,
            coordinator,
        }
        .publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Match-system mutators
    // -----------------------------------------------------------------------

    /// Place `amount` more of `participant_id`'s stake at risk in the open round.
    ///
    /// No upper bound is checked here; the match system bounds `amount` by the
    /// participant's actual stake.
    pub fn increase_risk(
        env: Env,
        caller: Address,
        amount: i128,
        participant_id: u64,
        owner: Address,
    ) -> Result<(), Error> {
        require_match_system(&env, &caller)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let round = get_current_round(&env);
        let entry_key = DataKey::AtRisk(round, participant_id);
        let loss_key = DataKey::LifetimeLoss(owner.clone());

        let at_risk = credit(get_i128(&env, &entry_key), amount).ok_or(Error::Overflow)?;
        let total = credit(get_i128(&env, &DataKey::TotalAtRisk(round)), amount)
            .ok_or(Error::Overflow)?;
        let lifetime = credit(get_i128(&env, &loss_key), amount).ok_or(Error::Overflow)?;

        set_i128(&env, &entry_key, at_risk);
        set_i128(&env, &DataKey::TotalAtRisk(round), total);
        set_i128(&env, &loss_key, lifetime);

        RiskIncreased {
            round,
            participant_id,
            owner,
            amount,
            at_risk,
        }
        .publish(&env);
        Ok(())
    }

    /// Hand `amount` of `participant_id`'s at-risk stake back to the match system.
    ///
    /// Every balance is validated before the transfer and written only after it
    /// succeeds. An amount above the participant's open-round balance, or above
    /// the owner's lifetime loss, is an `Underflow`.
    pub fn reclaim(
        env: Env,
        caller: Address,
        amount: i128,
        participant_id: u64,
        owner: Address,
    ) -> Result<(), Error> {
        require_match_system(&env, &caller)?;
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let round = get_current_round(&env);
        let entry_key = DataKey::AtRisk(round, participant_id);
        let loss_key = DataKey::LifetimeLoss(owner.clone());

        let at_risk = debit(get_i128(&env, &entry_key), amount).ok_or(Error::Underflow)?;
        let total = debit(get_i128(&env, &DataKey::TotalAtRisk(round)), amount)
            .ok_or(Error::Underflow)?;
        let lifetime = debit(get_i128(&env, &loss_key), amount).ok_or(Error::Underflow)?;

        transfer_out(&env, &caller, amount)?;

        set_i128(&env, &entry_key, at_risk);
        set_i128(&env, &DataKey::TotalAtRisk(round), total);
        set_i128(&env, &loss_key, lifetime);

        RiskReclaimed {
            round,
            participant_id,
            owner,
            amount,
            at_risk,
        }
        .publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Round advance (coordinator only)
    // -----------------------------------------------------------------------

    /// Sweep the open round's remaining stake to the treasury and open
    /// `next_round_id`.
    ///
    /// `next_round_id` must be exactly one past the current round, so a
    /// repeated or skipped advance fails. If the sweep transfer fails the
    /// round does not move.
    pub fn advance_round(env: Env, caller: Address, next_round_id: u32) -> Result<(), Error> {
        require_coordinator(&env, &caller)?;

        let round = get_current_round(&env);
        let expected = round.checked_add(1).ok_or(Error::Overflow)?;
        if next_round_id != expected {
            return Err(Error::RoundOutOfOrder);
        }

        let total = get_i128(&env, &DataKey::TotalAtRisk(round));
        let treasury = get_address(&env, &DataKey::Treasury)?;
        if total > 0 {
            transfer_out(&env, &treasury, total)?;
        }

        set_i128(&env, &DataKey::TotalAtRisk(round), 0);
        set_i128(&env, &DataKey::SweptTotal(round), total);
        env.storage()
            .instance()
            .set(&DataKey::CurrentRound, &next_round_id);

        RoundSwept {
            round,
            next_round: next_round_id,
            treasury,
            amount: total,
        }
        .publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub fn update_config(env: Env, admin: Address, update: ConfigUpdate) -> Result<(), Error> {
        require_admin(&env, &admin)?;

        match &update {
            ConfigUpdate::TransferAdmin(new_admin) => {
                env.storage().instance().set(&DataKey::Admin, new_admin);
            }
            ConfigUpdate::SetMatchSystem(match_system) => {
                env.storage()
                    .instance()
                    .set(&DataKey::MatchSystem, match_system);
            }
            ConfigUpdate::SetTreasury(treasury) => {
                env.storage().instance().set(&DataKey::Treasury, treasury);
            }
        }

        ConfigUpdated { admin, update }.publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn current_round(env: Env) -> u32 {
        get_current_round(&env)
    }

    /// Open-round at-risk balance of `participant_id`.
    pub fn get_at_risk(env: Env, participant_id: u64) -> i128 {
        let round = get_current_round(&env);
        get_i128(&env, &DataKey::AtRisk(round, participant_id))
    }

    /// At-risk balance for any round. Closed rounds were swept, so they report 0.
    pub fn get_at_risk_for_round(env: Env, round: u32, participant_id: u64) -> i128 {
        if round < get_current_round(&env) {
            return 0;
        }
        get_i128(&env, &DataKey::AtRisk(round, participant_id))
    }

    /// What `participant_id` forfeited when `round` closed.
    pub fn get_forfeited(env: Env, round: u32, participant_id: u64) -> Result<i128, Error> {
        if round >= get_current_round(&env) {
            return Err(Error::RoundNotClosed);
        }
        Ok(get_i128(&env, &DataKey::AtRisk(round, participant_id)))
    }

    pub fn total_at_risk(env: Env, round: u32) -> i128 {
        get_i128(&env, &DataKey::TotalAtRisk(round))
    }

    pub fn swept_total(env: Env, round: u32) -> i128 {
        get_i128(&env, &DataKey::SweptTotal(round))
    }

    pub fn lifetime_loss(env: Env, owner: Address) -> i128 {
        get_i128(&env, &DataKey::LifetimeLoss(owner))
    }

    pub fn ledger_state(env: Env) -> Result<LedgerState, Error> {
        let admin = get_address(&env, &DataKey::Admin)?;
        let round = get_current_round(&env);
        Ok(LedgerState {
            admin,
            token: get_address(&env, &DataKey::Token)?,
            match_system: get_address(&env, &DataKey::MatchSystem)?,
            treasury: get_address(&env, &DataKey::Treasury)?,
            coordinator: get_address(&env, &DataKey::Coordinator)?,
            current_round: round,
            total_at_risk: get_i128(&env, &DataKey::TotalAtRisk(round)),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn get_address(env: &Env, key: &DataKey) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(key)
        .ok_or(Error::NotInitialized)
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin = get_address(env, &DataKey::Admin)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn require_match_system(env: &Env, caller: &Address) -> Result<(), Error> {
    let match_system = get_address(env, &DataKey::MatchSystem)?;
    caller.require_auth();
    if caller != &match_system {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn require_coordinator(env: &Env, caller: &Address) -> Result<(), Error> {
    let coordinator = get_address(env, &DataKey::Coordinator)?;
    caller.require_auth();
    if caller != &coordinator {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn get_current_round(env: &Env) -> u32 {
    env.storage()
        .instance()
        .get(&DataKey::CurrentRound)
        .unwrap_or(0)
}

/// Move `amount` of the staked token from the ledger to `to`.
/// A rejected transfer surfaces as `TransferFailed`, never as success.
fn transfer_out(env: &Env, to: &Address, amount: i128) -> Result<(), Error> {
    let token = get_address(env, &DataKey::Token)?;
    let ledger = env.current_contract_address();
    match TokenClient::new(env, &token).try_transfer(&ledger, to, &amount) {
        Ok(Ok(())) => Ok(()),
        _ => Err(Error::TransferFailed),
    }
}

fn get_i128(env: &Env, key: &DataKey) -> i128 {
    env.storage().persistent().get(key).unwrap_or(0)
}

/// Write an i128 to persistent storage and extend its TTL in one step.
fn set_i128(env: &Env, key: &DataKey, value: i128) {
    env.storage().persistent().set(key, &value);
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test;
