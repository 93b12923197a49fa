use common::{Amount, GameError};
use tokio::sync::{mpsc, oneshot};

use crate::database_manager::DatabaseRequest;

/// The balance of record. Every component that moves money goes through here
/// rather than touching user rows itself; the database actor behind the
/// channel applies each delta as a single conditional update.
#[derive(Clone)]
pub struct Ledger {
    database_requester: mpsc::Sender<DatabaseRequest>,
}

impl Ledger {
    pub fn new(database_requester: mpsc::Sender<DatabaseRequest>) -> Self {
        Self { database_requester }
    }

    pub async fn balance_of(&self, name: &str) -> Result<Amount, GameError> {
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::GetUser {
                name: name.into(),
                responder: tx,
            })
            .await
            .map_err(GameError::storage)?;
        let user = recv(rx).await?.ok_or(GameError::UnknownUser)?;
        Ok(user.balance)
    }

    /// Applies `delta` atomically, returning the new balance. Fails with
    /// InsufficientFunds when a negative delta would overdraw the account.
    pub async fn apply_delta(&self, name: &str, delta: i64) -> Result<Amount, GameError> {
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::ApplyBalanceDelta {
                name: name.into(),
                delta,
                responder: tx,
            })
            .await
            .map_err(GameError::storage)?;
        recv(rx).await?.ok_or(GameError::InsufficientFunds)
    }

    /// Moves `stake` from loser to winner as one unit. Returns false when the
    /// loser could not cover the stake and nothing moved.
    pub async fn transfer(&self, winner: &str, loser: &str, stake: Amount) -> Result<bool, GameError> {
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::TransferStake {
                winner: winner.into(),
                loser: loser.into(),
                stake,
                responder: tx,
            })
            .await
            .map_err(GameError::storage)?;
        recv(rx).await
    }
}

async fn recv<T>(rx: oneshot::Receiver<anyhow::Result<T>>) -> Result<T, GameError> {
    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(GameError::storage(e)),
        Err(e) => Err(GameError::storage(e)),
    }
}
