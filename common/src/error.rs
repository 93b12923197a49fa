use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything a wager or lobby operation can fail with. All of these are
/// recoverable and are sent back to the client verbatim.
#[derive(Error, Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum GameError {
    #[error("stake must be positive and no more than your balance")]
    InvalidStake,
    #[error("win chance must be between 1 and 99")]
    InvalidProbability,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("lobby is not open")]
    LobbyUnavailable,
    #[error("you cannot join your own lobby")]
    SelfJoinNotAllowed,
    #[error("only the lobby creator may do that")]
    NotOwner,
    #[error("lobby has already been settled")]
    AlreadySettled,
    #[error("no such user")]
    UnknownUser,
    #[error("storage failure: {0}")]
    Storage(String),
}

impl GameError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        GameError::Storage(err.to_string())
    }
}
