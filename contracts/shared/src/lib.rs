//! Shared types and cross-contract interfaces for the arena round ledgers.
//!
//! The stake ledger, the points ledger and the round coordinator never link
//! against each other's crates. Each one talks to its collaborators through
//! the `#[contractclient]` interfaces declared here, so the only contract
//! coupling is the function names and argument shapes below.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{contractclient, contracttype, Address, Env, String};

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
/// Every persistent write extends the written entry to this TTL; reads do not.
/// An unclaimed win list is rewritten on each new win, so it lives at least
/// this long after the owner's latest win.
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

/// Caller-supplied description of one reward asset.
///
/// The issuer mints whatever it is handed; nothing on the ledger side checks
/// the descriptor against a canonical item table.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewardDescriptor {
    /// Reference to the item's off-chain metadata.
    pub metadata_uri: String,
    pub category: u32,
    pub primary_attr: u32,
    pub secondary_attr: u32,
}

// ---------------------------------------------------------------------------
// External ports
// ---------------------------------------------------------------------------

/// Reward marketplace / inventory contract that mints reward assets.
#[contractclient(name = "RewardIssuerClient")]
pub trait RewardIssuer {
    /// Mint one asset described by `descriptor` to `to` and return its id.
    /// `minter` is the ledger requesting the mint.
    fn issue(env: Env, minter: Address, to: Address, descriptor: RewardDescriptor) -> u64;
}

/// Registry resolving a competing participant to its current owner.
#[contractclient(name = "OwnerRegistryClient")]
pub trait OwnerRegistry {
    fn owner_of(env: Env, participant_id: u64) -> Address;
}

// ---------------------------------------------------------------------------
// Internal ports between the ledger contracts
// ---------------------------------------------------------------------------

/// Round coordinator as seen by the points ledger.
#[contractclient(name = "CoordinatorPortClient")]
pub trait CoordinatorPort {
    fn current_round(env: Env) -> u32;
    /// Close `closing_round` and open the next one. Returns the new round id.
    fn advance_round(env: Env, caller: Address, closing_round: u32) -> u32;
}

/// Stake ledger as seen by the round coordinator.
#[contractclient(name = "StakeRoundPortClient")]
pub trait StakeRoundPort {
    fn current_round(env: Env) -> u32;
    fn advance_round(env: Env, caller: Address, next_round_id: u32);
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

/// Subtract `amount` from `balance`, refusing to go below zero.
///
/// Plain `checked_sub` on `i128` only catches wrap-around at `i128::MIN`; a
/// ledger balance must also never turn negative.
pub fn debit(balance: i128, amount: i128) -> Option<i128> {
    if amount < 0 || amount > balance {
        return None;
    }
    balance.checked_sub(amount)
}

/// Add a non-negative `amount` to `balance`.
pub fn credit(balance: i128, amount: i128) -> Option<i128> {
    if amount < 0 {
        return None;
    }
    balance.checked_add(amount)
}
