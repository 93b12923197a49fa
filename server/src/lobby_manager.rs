use std::sync::Arc;

use common::{Amount, CoinSide, GameError, LobbyEvent, LobbyInfo, LobbyStatus};
use surrealdb::sql::Thing;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::database::{lobby_thing, DbGameRecord, DbLobby};
use crate::database_manager::DatabaseRequest;
use crate::ledger::Ledger;
use crate::recorder::ResultRecorder;
use crate::rng::RandomnessSource;

pub type Responder<T> = oneshot::Sender<Result<T, GameError>>;

pub enum LobbyRequest {
    Create {
        creator: String,
        stake: Amount,
        side: CoinSide,
        responder: Responder<LobbyInfo>,
    },
    Join {
        lobby_id: String,
        joiner: String,
        responder: Responder<LobbyInfo>,
    },
    Cancel {
        lobby_id: String,
        requester: String,
        responder: Responder<LobbyInfo>,
    },
    ListOpen {
        responder: Responder<Vec<LobbyInfo>>,
    },
    Settle {
        lobby_id: String,
        responder: Responder<()>,
    },
}

// Owns the duel lifecycle. All lobby transitions run through this actor's
// queue, and each transition is additionally guarded by a compare-and-set on
// the stored status, so a join or settlement can succeed at most once no
// matter how requests interleave.
pub struct LobbyManager {
    work_queue: mpsc::Receiver<LobbyRequest>,
    database_requester: mpsc::Sender<DatabaseRequest>,
    ledger: Ledger,
    recorder: ResultRecorder,
    randomness: Arc<dyn RandomnessSource>,
    events: broadcast::Sender<LobbyEvent>,
}

impl LobbyManager {
    pub fn new(
        work_queue: mpsc::Receiver<LobbyRequest>,
        database_requester: mpsc::Sender<DatabaseRequest>,
        ledger: Ledger,
        recorder: ResultRecorder,
        randomness: Arc<dyn RandomnessSource>,
        events: broadcast::Sender<LobbyEvent>,
    ) -> Self {
        Self {
            work_queue,
            database_requester,
            ledger,
            recorder,
            randomness,
            events,
        }
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            // we do not care if the receiver has already disappeared
            match request {
                LobbyRequest::Create {
                    creator,
                    stake,
                    side,
                    responder,
                } => {
                    responder.send(self.create_lobby(creator, stake, side).await).ok();
                }
                LobbyRequest::Join {
                    lobby_id,
                    joiner,
                    responder,
                } => {
                    responder.send(self.join_lobby(lobby_id, joiner).await).ok();
                }
                LobbyRequest::Cancel {
                    lobby_id,
                    requester,
                    responder,
                } => {
                    responder.send(self.cancel_lobby(lobby_id, requester).await).ok();
                }
                LobbyRequest::ListOpen { responder } => {
                    responder.send(self.list_open().await).ok();
                }
                LobbyRequest::Settle {
                    lobby_id,
                    responder,
                } => {
                    responder.send(self.settle_lobby(lobby_id).await).ok();
                }
            }
        }
    }

    fn publish(&self, lobby: DbLobby) -> LobbyInfo {
        let info: LobbyInfo = lobby.into();
        self.events.send(LobbyEvent { lobby: info.clone() }).ok();
        info
    }

    async fn create_lobby(
        &mut self,
        creator: String,
        stake: Amount,
        side: CoinSide,
    ) -> Result<LobbyInfo, GameError> {
        if stake == 0 {
            return Err(GameError::InvalidStake);
        }
        // the stake is checked but not escrowed here; it is only debited at
        // settlement
        let balance = self.ledger.balance_of(&creator).await?;
        if stake > balance {
            return Err(GameError::InsufficientFunds);
        }

        let lobby = DbLobby::new(&creator, stake, side);
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::AddLobby {
                lobby: lobby.clone(),
                responder: tx,
            })
            .await
            .map_err(GameError::storage)?;
        recv(rx).await?;

        tracing::info!(lobby = %lobby.id, %creator, stake, "lobby opened");
        Ok(self.publish(lobby))
    }

    async fn join_lobby(&mut self, lobby_id: String, joiner: String) -> Result<LobbyInfo, GameError> {
        let id = lobby_thing(&lobby_id);
        let lobby = self
            .get_lobby(&id)
            .await?
            .ok_or(GameError::LobbyUnavailable)?;

        if lobby.creator.id.to_raw() == joiner {
            return Err(GameError::SelfJoinNotAllowed);
        }
        let balance = self.ledger.balance_of(&joiner).await?;
        if lobby.stake > balance {
            return Err(GameError::InsufficientFunds);
        }

        // the compare-and-set on status decides the race; a second joiner, or
        // a retry against a lobby that has moved on, lands here with None
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::FillLobby {
                id,
                opponent: joiner.clone(),
                responder: tx,
            })
            .await
            .map_err(GameError::storage)?;
        let filled = recv(rx).await?.ok_or(GameError::LobbyUnavailable)?;

        tracing::info!(lobby = %filled.id, %joiner, "lobby filled");
        Ok(self.publish(filled))
    }

    async fn cancel_lobby(
        &mut self,
        lobby_id: String,
        requester: String,
    ) -> Result<LobbyInfo, GameError> {
        let id = lobby_thing(&lobby_id);
        let lobby = self
            .get_lobby(&id)
            .await?
            .ok_or(GameError::LobbyUnavailable)?;

        if lobby.creator.id.to_raw() != requester {
            return Err(GameError::NotOwner);
        }

        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::CancelLobby { id, responder: tx })
            .await
            .map_err(GameError::storage)?;
        let cancelled = recv(rx).await?.ok_or(GameError::LobbyUnavailable)?;

        tracing::info!(lobby = %cancelled.id, "lobby cancelled");
        Ok(self.publish(cancelled))
    }

    async fn list_open(&mut self) -> Result<Vec<LobbyInfo>, GameError> {
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::GetOpenLobbies { responder: tx })
            .await
            .map_err(GameError::storage)?;
        Ok(recv(rx).await?.into_iter().map(Into::into).collect())
    }

    async fn settle_lobby(&mut self, lobby_id: String) -> Result<(), GameError> {
        let id = lobby_thing(&lobby_id);
        let lobby = self
            .get_lobby(&id)
            .await?
            .ok_or(GameError::LobbyUnavailable)?;

        let opponent = match (lobby.status, &lobby.opponent) {
            (LobbyStatus::Filled, Some(opponent)) => opponent.id.to_raw(),
            (LobbyStatus::Settled, _) => return Err(GameError::AlreadySettled),
            _ => return Err(GameError::LobbyUnavailable),
        };
        let creator = lobby.creator.id.to_raw();

        let resolved_side = self.randomness.draw_side();
        let (winner, loser) = if resolved_side == lobby.creator_side {
            (creator.clone(), opponent.clone())
        } else {
            (opponent.clone(), creator.clone())
        };

        // FILLED -> SETTLED is the exactly-once guard. A duplicate settlement
        // trigger loses this transition and stops before any money moves.
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::MarkSettled {
                id,
                resolved_side,
                winner: winner.clone(),
                responder: tx,
            })
            .await
            .map_err(GameError::storage)?;
        let settled = recv(rx).await?.ok_or(GameError::AlreadySettled)?;

        let transferred = self.ledger.transfer(&winner, &loser, lobby.stake).await?;
        if !transferred {
            // stakes are not escrowed, so the loser can be broke by now; we
            // keep balances non-negative and conserved rather than minting a
            // payout
            tracing::warn!(lobby = %settled.id, %loser, stake = lobby.stake, "loser could not cover stake, no transfer");
        }

        // history mirrors what the ledger actually did
        let winner_payout = if transferred {
            lobby.stake.saturating_mul(2)
        } else {
            0
        };
        self.recorder
            .record(DbGameRecord::coin_flip(
                &winner,
                lobby.stake,
                resolved_side,
                true,
                winner_payout,
            ))
            .await;
        self.recorder
            .record(DbGameRecord::coin_flip(
                &loser,
                lobby.stake,
                resolved_side,
                false,
                0,
            ))
            .await;

        tracing::info!(lobby = %settled.id, %winner, side = ?resolved_side, "lobby settled");
        self.publish(settled);
        Ok(())
    }

    async fn get_lobby(&mut self, id: &Thing) -> Result<Option<DbLobby>, GameError> {
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::GetLobby {
                id: id.clone(),
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

/// Listens for FILLED lobbies and triggers settlement. Delivery is
/// at-least-once; the status compare-and-set inside the manager makes a
/// duplicate trigger a no-op.
pub async fn drive_settlement(
    mut events: broadcast::Receiver<LobbyEvent>,
    lobby_requester: mpsc::Sender<LobbyRequest>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if event.lobby.status != LobbyStatus::Filled {
                    continue;
                }
                let (tx, rx) = oneshot::channel();
                if lobby_requester
                    .send(LobbyRequest::Settle {
                        lobby_id: event.lobby.id.clone(),
                        responder: tx,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
                match rx.await {
                    Ok(Ok(())) | Ok(Err(GameError::AlreadySettled)) => {}
                    Ok(Err(e)) => {
                        tracing::error!(lobby = %event.lobby.id, error = %e, "settlement failed")
                    }
                    Err(_) => break,
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "settlement driver lagged behind lobby events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
