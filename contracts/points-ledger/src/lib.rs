//! Arena Points & Winner Ledger Contract
//!
//! Accumulates performance points per participant, freezes a fixed-size
//! winner set for each round, and lets winners claim one reward per win.
//!
//! ## Round flow
//! 1. The match system calls `add_points` while the round is open.
//! 2. An operator calls `pick_winners` with exactly `winners_per_period`
//!    participants. Their owners are resolved through the registry and frozen
//!    as the round's winner snapshot, the winners' points are reset, and the
//!    coordinator is told to close the round. Losers keep their points.
//! 3. Any owner calls `claim_rewards` with one descriptor per unclaimed win.
//!
//! The round id is never stored here. It is read through the coordinator,
//! which reads it from the stake ledger.
//!
//! ## Claims
//! `pick_winners` appends the round id to each winning owner's `WinRounds`
//! list, once per appearance in the snapshot. A claim reads only that list,
//! so its cost follows the claimer's unclaimed wins and not the number of
//! rounds since the last claim. Wins are ordered rounds ascending, snapshot
//! order within a round. The descriptor list is checked against them before
//! anything is minted; win `i` is paired with descriptor `i`. Surplus
//! descriptors are ignored.
//!
//! ## Storage Strategy
//! - `instance()`: `Config`, `Operator(addr)` flags.
//! - `persistent()`: `Points(participant)`, `TotalPoints`, `Winners(round)`,
//!   `SelectionComplete(round)`, `WinRounds(owner)`, `ClaimCursor(claimer)`.
#![no_std]
#![allow(unexpected_cfgs)]

use arena_shared::{
    CoordinatorPortClient, OwnerRegistryClient, RewardDescriptor, RewardIssuerClient,
    PERSISTENT_BUMP_LEDGERS,
};
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Env, Vec,
};

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized       = 1,
    NotInitialized           = 2,
    NotAuthorized            = 3,
    InvalidConfig            = 4,
    Overflow                 = 5,
    Underflow                = 6,
    /// Winner list length differs from `winners_per_period`.
    WrongWinnerCount         = 7,
    DuplicateWinner          = 8,
    /// Winners were already picked for the open round.
    SelectionAlreadyComplete = 9,
    WinnersNotSelected       = 10,
    /// Fewer descriptors than unclaimed wins.
    InsufficientDescriptors  = 11,
    OwnerLookupFailed        = 12,
    IssuanceFailed           = 13,
    RoundLookupFailed        = 14,
    RoundAdvanceFailed       = 15,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // --- instance() ---
    Config,
    Operator(Address),
    // --- persistent() ---
    Points(u64),
    TotalPoints,
    /// Owners selected as winners for a round, in selection order.
    Winners(u32),
    SelectionComplete(u32),
    /// Rounds the owner won and has not claimed, one entry per win.
    WinRounds(Address),
    /// First round the claimer has not scanned yet.
    ClaimCursor(Address),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PointsConfig {
    pub admin: Address,
    /// Only caller allowed to add points.
    pub match_system: Address,
    pub registry: Address,
    pub issuer: Address,
    pub coordinator: Address,
    pub winners_per_period: u32,
}

/// Admin-gated configuration changes.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigUpdate {
    TransferAdmin(Address),
    GrantOperator(Address),
    RevokeOperator(Address),
    SetMatchSystem(Address),
    SetWinnersPerPeriod(u32),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    pub admin: Address,
    pub coordinator: Address,
    pub winners_per_period: u32,
}

#[contractevent]
pub struct PointsAdded {
    #[topic]
    pub participant_id: u64,
    pub amount: u64,
    pub points: u64,
}

#[contractevent]
pub struct WinnersPicked {
    #[topic]
    pub round: u32,
    pub winners: Vec<Address>,
}

#[contractevent]
pub struct RewardIssued {
    #[topic]
    pub claimer: Address,
    #[topic]
    pub round: u32,
    pub asset_id: u64,
}

#[contractevent]
pub struct RewardsClaimed {
    #[topic]
    pub claimer: Address,
    pub count: u32,
    pub claimed_through: u32,
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
pub struct PointsLedger;

#[contractimpl]
impl PointsLedger {
    /// Initialize the ledger. May only be called once.
    pub fn init(
        env: Env,
        admin: Address,
        match_system: Address,
        registry: Address,
        issuer: Address,
        coordinator: Address,
        winners_per_period: u32,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();
        if winners_per_period == 0 {
            return Err(Error::InvalidConfig);
        }

        let config = PointsConfig {
            admin: admin.clone(),
            match_system,
            registry,
            issuer,
            coordinator: coordinator.clone(),
            winners_per_period,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        set_persistent(&env, &DataKey::TotalPoints, &0u64);

        Initialized {
            admin,
            coordinator,
            winners_per_period,
        }
        .publish(&env);
        Ok(())
    }

    /// Credit `amount` points to `participant_id`. Match system only.
    /// A zero amount changes nothing and publishes nothing.
    pub fn add_points(
        env: Env,
        caller: Address,
        participant_id: u64,
        amount: u64,
    ) -> Result<(), Error> {
        let config = load_config(&env)?;
        require_caller(&caller, &config.match_system)?;
        if amount == 0 {
            return Ok(());
        }

        let points = read_points(&env, participant_id)
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        let total = read_total_points(&env)
            .checked_add(amount)
            .ok_or(Error::Overflow)?;

        set_persistent(&env, &DataKey::Points(participant_id), &points);
        set_persistent(&env, &DataKey::TotalPoints, &total);

        PointsAdded {
            participant_id,
            amount,
            points,
        }
        .publish(&env);
        Ok(())
    }

    /// Freeze the open round's winners and close the round.
    ///
    /// Each winner's points are reset to zero and removed from the total;
    /// every other participant keeps theirs. The coordinator then sweeps the
    /// stake ledger and opens the next round. If any step fails, nothing
    /// here is written either. Returns the newly opened round.
    pub fn pick_winners(env: Env, operator: Address, winners: Vec<u64>) -> Result<u32, Error> {
        let config = load_config(&env)?;
        require_operator(&env, &config, &operator)?;

        if winners.len() != config.winners_per_period {
            return Err(Error::WrongWinnerCount);
        }

        let round = read_current_round(&env, &config)?;
        if selection_done(&env, round) {
            return Err(Error::SelectionAlreadyComplete);
        }

        let registry = OwnerRegistryClient::new(&env, &config.registry);
        let mut total = read_total_points(&env);
        let mut owners: Vec<Address> = Vec::new(&env);

        for i in 0..winners.len() {
            let participant_id = winners.get_unchecked(i);
            for j in 0..i {
                if winners.get_unchecked(j) == participant_id {
                    return Err(Error::DuplicateWinner);
                }
            }

            let owner = match registry.try_owner_of(&participant_id) {
                Ok(Ok(owner)) => owner,
                _ => return Err(Error::OwnerLookupFailed),
            };

            total = total
                .checked_sub(read_points(&env, participant_id))
                .ok_or(Error::Underflow)?;
            set_persistent(&env, &DataKey::Points(participant_id), &0u64);

            let mut rounds = read_win_rounds(&env, &owner);
            rounds.push_back(round);
            set_persistent(&env, &DataKey::WinRounds(owner.clone()), &rounds);
            owners.push_back(owner);
        }

        set_persistent(&env, &DataKey::TotalPoints, &total);
        set_persistent(&env, &DataKey::Winners(round), &owners);
        set_persistent(&env, &DataKey::SelectionComplete(round), &true);

        WinnersPicked {
            round,
            winners: owners,
        }
        .publish(&env);

        let coordinator = CoordinatorPortClient::new(&env, &config.coordinator);
        match coordinator.try_advance_round(&env.current_contract_address(), &round) {
            Ok(Ok(next_round)) => Ok(next_round),
            _ => Err(Error::RoundAdvanceFailed),
        }
    }

    /// Mint one reward per unclaimed win to `claimer`.
    ///
    /// `descriptors[i]` describes the reward for the i-th unclaimed win. The
    /// call fails before minting anything if there are fewer descriptors than
    /// wins. On success the claimer's cursor moves to the open round, even if
    /// no wins were found. Returns the number of rewards issued.
    pub fn claim_rewards(
        env: Env,
        claimer: Address,
        descriptors: Vec<RewardDescriptor>,
    ) -> Result<u32, Error> {
        claimer.require_auth();
        let config = load_config(&env)?;

        let round = read_current_round(&env, &config)?;
        let wins = collect_wins(&env, &claimer, round);
        if descriptors.len() < wins.len() {
            return Err(Error::InsufficientDescriptors);
        }

        set_persistent(&env, &DataKey::ClaimCursor(claimer.clone()), &round);
        retain_open_wins(&env, &claimer, round);

        let issuer = RewardIssuerClient::new(&env, &config.issuer);
        let minter = env.current_contract_address();
        for i in 0..wins.len() {
            let win_round = wins.get_unchecked(i);
            let descriptor = descriptors.get_unchecked(i);
            let asset_id = match issuer.try_issue(&minter, &claimer, &descriptor) {
                Ok(Ok(asset_id)) => asset_id,
                _ => return Err(Error::IssuanceFailed),
            };
            RewardIssued {
                claimer: claimer.clone(),
                round: win_round,
                asset_id,
            }
            .publish(&env);
        }

        let count = wins.len();
        RewardsClaimed {
            claimer,
            count,
            claimed_through: round,
        }
        .publish(&env);
        Ok(count)
    }

    /// Number of descriptors the next `claim_rewards` from `claimer` consumes.
    pub fn get_unclaimed_reward_count(env: Env, claimer: Address) -> Result<u32, Error> {
        let config = load_config(&env)?;
        let round = read_current_round(&env, &config)?;
        Ok(collect_wins(&env, &claimer, round).len())
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub fn update_config(env: Env, admin: Address, update: ConfigUpdate) -> Result<(), Error> {
        let mut config = load_config(&env)?;
        require_caller(&admin, &config.admin)?;

        match &update {
            ConfigUpdate::TransferAdmin(new_admin) => {
                config.admin = new_admin.clone();
            }
            ConfigUpdate::GrantOperator(operator) => {
                env.storage()
                    .instance()
                    .set(&DataKey::Operator(operator.clone()), &true);
            }
            ConfigUpdate::RevokeOperator(operator) => {
                env.storage()
                    .instance()
                    .remove(&DataKey::Operator(operator.clone()));
            }
            ConfigUpdate::SetMatchSystem(match_system) => {
                config.match_system = match_system.clone();
            }
            ConfigUpdate::SetWinnersPerPeriod(count) => {
                if *count == 0 {
                    return Err(Error::InvalidConfig);
                }
                config.winners_per_period = *count;
            }
        }
        env.storage().instance().set(&DataKey::Config, &config);

        ConfigUpdated { admin, update }.publish(&env);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn current_round(env: Env) -> Result<u32, Error> {
        let config = load_config(&env)?;
        read_current_round(&env, &config)
    }

    pub fn get_points(env: Env, participant_id: u64) -> u64 {
        read_points(&env, participant_id)
    }

    pub fn total_points(env: Env) -> u64 {
        read_total_points(&env)
    }

    pub fn winners(env: Env, round: u32) -> Result<Vec<Address>, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::Winners(round))
            .ok_or(Error::WinnersNotSelected)
    }

    pub fn is_selection_complete(env: Env, round: u32) -> bool {
        selection_done(&env, round)
    }

    pub fn claim_cursor(env: Env, claimer: Address) -> u32 {
        read_claim_cursor(&env, &claimer)
    }

    pub fn winners_per_period(env: Env) -> Result<u32, Error> {
        Ok(load_config(&env)?.winners_per_period)
    }

    pub fn is_operator(env: Env, addr: Address) -> bool {
        env.storage()
            .instance()
            .get(&DataKey::Operator(addr))
            .unwrap_or(false)
    }

    pub fn config(env: Env) -> Result<PointsConfig, Error> {
        load_config(&env)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config(env: &Env) -> Result<PointsConfig, Error> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(Error::NotInitialized)
}

fn require_caller(caller: &Address, expected: &Address) -> Result<(), Error> {
    caller.require_auth();
    if caller != expected {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

/// Admin or any address holding an operator grant.
fn require_operator(env: &Env, config: &PointsConfig, caller: &Address) -> Result<(), Error> {
    caller.require_auth();
    if caller == &config.admin {
        return Ok(());
    }
    let granted: bool = env
        .storage()
        .instance()
        .get(&DataKey::Operator(caller.clone()))
        .unwrap_or(false);
    if !granted {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn read_current_round(env: &Env, config: &PointsConfig) -> Result<u32, Error> {
    match CoordinatorPortClient::new(env, &config.coordinator).try_current_round() {
        Ok(Ok(round)) => Ok(round),
        _ => Err(Error::RoundLookupFailed),
    }
}

/// One entry per unclaimed win, holding the round it was won in, for rounds
/// from the claimer's cursor up to `open_round`. An owner listed k times in a
/// snapshot contributes k entries.
fn collect_wins(env: &Env, claimer: &Address, open_round: u32) -> Vec<u32> {
    let cursor = read_claim_cursor(env, claimer);
    let mut wins: Vec<u32> = Vec::new(env);
    for round in read_win_rounds(env, claimer).iter() {
        if round >= cursor && round < open_round {
            wins.push_back(round);
        }
    }
    wins
}

/// Drop every win before `open_round` from the claimer's list once claimed.
fn retain_open_wins(env: &Env, claimer: &Address, open_round: u32) {
    let key = DataKey::WinRounds(claimer.clone());
    if !env.storage().persistent().has(&key) {
        return;
    }
    let mut remaining: Vec<u32> = Vec::new(env);
    for round in read_win_rounds(env, claimer).iter() {
        if round >= open_round {
            remaining.push_back(round);
        }
    }
    if remaining.is_empty() {
        env.storage().persistent().remove(&key);
    } else {
        set_persistent(env, &key, &remaining);
    }
}

fn read_win_rounds(env: &Env, owner: &Address) -> Vec<u32> {
    env.storage()
        .persistent()
        .get(&DataKey::WinRounds(owner.clone()))
        .unwrap_or(Vec::new(env))
}

fn read_points(env: &Env, participant_id: u64) -> u64 {
    env.storage()
        .persistent()
        .get(&DataKey::Points(participant_id))
        .unwrap_or(0)
}

fn read_total_points(env: &Env) -> u64 {
    env.storage()
        .persistent()
        .get(&DataKey::TotalPoints)
        .unwrap_or(0)
}

fn read_claim_cursor(env: &Env, claimer: &Address) -> u32 {
    env.storage()
        .persistent()
        .get(&DataKey::ClaimCursor(claimer.clone()))
        .unwrap_or(0)
}

fn selection_done(env: &Env, round: u32) -> bool {
    env.storage()
        .persistent()
        .get(&DataKey::SelectionComplete(round))
        .unwrap_or(false)
}

/// Write to persistent storage and extend the entry's TTL in one step.
fn set_persistent<V>(env: &Env, key: &DataKey, value: &V)
where
    V: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(key, value);
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
