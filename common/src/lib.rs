use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod network;

pub use error::GameError;

/// Balances are carried in minor units (cents).
pub type Amount = u64;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct User {
    pub name: String,
    pub balance: Amount,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CoinSide {
    Heads,
    Tails,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Open,
    Filled,
    Settled,
    Cancelled,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Dice,
    CoinFlip,
}

// A duel lobby as presented to clients. The winner and resolved side stay
// empty until settlement.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct LobbyInfo {
    pub id: String,
    pub creator: String,
    pub stake: Amount,
    pub creator_side: CoinSide,
    pub status: LobbyStatus,
    pub opponent: Option<String>,
    pub resolved_side: Option<CoinSide>,
    pub winner: Option<String>,
}

/// Outcome of one resolved solo wager, as returned to the wagering client.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct WagerReceipt {
    pub roll: u8,
    pub won: bool,
    pub payout: Amount,
    pub balance: Amount,
}

// Append-only history entry. For dice games `outcome` is the roll; for coin
// flips it is 1 for heads and 0 for tails.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct GameRecord {
    pub game: GameKind,
    pub stake: Amount,
    pub win_chance: u8,
    pub outcome: u8,
    pub won: bool,
    pub payout: Amount,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct LobbyEvent {
    pub lobby: LobbyInfo,
}
