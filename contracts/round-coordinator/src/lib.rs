//! Arena Round Coordinator Contract
//!
//! Keeps the stake ledger and the points ledger on the same round. The points
//! ledger reports a finished winner selection here; the coordinator checks the
//! report is for the open round and asks the stake ledger to sweep and advance.
//!
//! The coordinator stores no round counter. `current_round` is read from the
//! stake ledger, which is the only place the counter lives, and the stake
//! ledger accepts `advance_round` from this contract alone.
#![no_std]
#![allow(unexpected_cfgs)]

use arena_shared::StakeRoundPortClient;
use soroban_sdk::{contract, contracterror, contractevent, contractimpl, contracttype, Address, Env};

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotAuthorized      = 3,
    /// The reported round is not the stake ledger's open round.
    RoundOutOfOrder    = 4,
    Overflow           = 5,
    RoundLookupFailed  = 6,
    /// The stake ledger refused to sweep and advance.
    RoundAdvanceFailed = 7,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    StakeLedger,
    PointsLedger,
}

#[contractevent]
pub struct Initialized {
    pub admin: Address,
    pub stake_ledger: Address,
    pub points_ledger: Address,
}

#[contractevent]
pub struct RoundAdvanced {
    #[topic]
    pub closed_round: u32,
    pub next_round: u32,
}

#[contract]
pub struct RoundCoordinator;

#[contractimpl]
impl RoundCoordinator {
    /// Wire the coordinator to both ledgers. Call once; the wiring is fixed.
    pub fn init(
        env: Env,
        admin: Address,
        stake_ledger: Address,
        points_ledger: Address,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&DataKey::StakeLedger, &stake_ledger);
        env.storage()
            .instance()
            .set(&DataKey::PointsLedger, &points_ledger);

        Initialized {
            admin,
            stake_ledger,
            points_ledger,
        }
        .publish(&env);
        Ok(())
    }

    /// Close `closing_round` after the points ledger froze its winners.
    ///
    /// Only the points ledger may call this, and only for the open round, so
    /// a repeated or early signal fails instead of moving either ledger.
    /// Returns the round that is now open.
    pub fn advance_round(env: Env, caller: Address, closing_round: u32) -> Result<u32, Error> {
        let points_ledger = get_address(&env, &DataKey::PointsLedger)?;
        caller.require_auth();
        if caller != points_ledger {
            return Err(Error::NotAuthorized);
        }

        let stake = StakeRoundPortClient::new(&env, &get_address(&env, &DataKey::StakeLedger)?);
        let round = match stake.try_current_round() {
            Ok(Ok(round)) => round,
            _ => return Err(Error::RoundLookupFailed),
        };
        if closing_round != round {
            return Err(Error::RoundOutOfOrder);
        }

        let next_round = round.checked_add(1).ok_or(Error::Overflow)?;
        match stake.try_advance_round(&env.current_contract_address(), &next_round) {
            Ok(Ok(())) => {}
            _ => return Err(Error::RoundAdvanceFailed),
        }

        RoundAdvanced {
            closed_round: round,
            next_round,
        }
        .publish(&env);
        Ok(next_round)
    }

    pub fn current_round(env: Env) -> Result<u32, Error> {
        let stake = StakeRoundPortClient::new(&env, &get_address(&env, &DataKey::StakeLedger)?);
        match stake.try_current_round() {
            Ok(Ok(round)) => Ok(round),
            _ => Err(Error::RoundLookupFailed),
        }
    }

    pub fn stake_ledger(env: Env) -> Result<Address, Error> {
        get_address(&env, &DataKey::StakeLedger)
    }

    pub fn points_ledger(env: Env) -> Result<Address, Error> {
        get_address(&env, &DataKey::PointsLedger)
    }
}

fn get_address(env: &Env, key: &DataKey) -> Result<Address, Error> {
    env.storage()
        .instance()
        .get(key)
        .ok_or(Error::NotInitialized)
}
