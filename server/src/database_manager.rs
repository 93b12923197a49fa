use common::{Amount, CoinSide};
use surrealdb::sql::Thing;
use surrealdb::Connection;
use tokio::sync::{mpsc, oneshot};

use crate::database::{DatabaseConnection, DbGameRecord, DbLobby, DbUser};

pub type Responder<T> = oneshot::Sender<anyhow::Result<T>>;

pub enum DatabaseRequest {
    EnsureUser {
        name: String,
        responder: Responder<DbUser>,
    },
    GetUser {
        name: String,
        responder: Responder<Option<DbUser>>,
    },
    ApplyBalanceDelta {
        name: String,
        delta: i64,
        responder: Responder<Option<Amount>>,
    },
    TransferStake {
        winner: String,
        loser: String,
        stake: Amount,
        responder: Responder<bool>,
    },
    AddLobby {
        lobby: DbLobby,
        responder: Responder<()>,
    },
    GetLobby {
        id: Thing,
        responder: Responder<Option<DbLobby>>,
    },
    GetOpenLobbies {
        responder: Responder<Vec<DbLobby>>,
    },
    FillLobby {
        id: Thing,
        opponent: String,
        responder: Responder<Option<DbLobby>>,
    },
    CancelLobby {
        id: Thing,
        responder: Responder<Option<DbLobby>>,
    },
    MarkSettled {
        id: Thing,
        resolved_side: CoinSide,
        winner: String,
        responder: Responder<Option<DbLobby>>,
    },
    AddGameRecord {
        record: DbGameRecord,
        responder: Responder<()>,
    },
    GetRecordsForUser {
        name: String,
        responder: Responder<Vec<DbGameRecord>>,
    },
}

// The one and only writer to storage. Every balance and lobby mutation flows
// through this queue, so mutations are serialized even before the conditional
// updates in the storage layer come into play.
pub struct DatabaseManager<Conn: Connection> {
    db_connection: DatabaseConnection<Conn>,
    work_queue: mpsc::Receiver<DatabaseRequest>,
}

pub fn transform_err<T>(result: surrealdb::Result<T>) -> anyhow::Result<T> {
    match result {
        Ok(t) => Ok(t),
        Err(e) => Err(e.into()),
    }
}

impl<Conn: Connection> DatabaseManager<Conn> {
    pub fn new(
        db_connection: DatabaseConnection<Conn>,
        work_queue: mpsc::Receiver<DatabaseRequest>,
    ) -> Self {
        Self {
            db_connection,
            work_queue,
        }
    }

    pub async fn manage(&mut self) {
        while let Some(request) = self.work_queue.recv().await {
            match request {
                DatabaseRequest::EnsureUser { name, responder } => {
                    let resp = transform_err(self.db_connection.ensure_user(&name).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetUser { name, responder } => {
                    let resp = transform_err(self.db_connection.get_user(&name).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::ApplyBalanceDelta {
                    name,
                    delta,
                    responder,
                } => {
                    let resp =
                        transform_err(self.db_connection.apply_balance_delta(&name, delta).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::TransferStake {
                    winner,
                    loser,
                    stake,
                    responder,
                } => {
                    let resp = transform_err(
                        self.db_connection
                            .transfer_stake(&winner, &loser, stake)
                            .await,
                    );
                    let _ = responder.send(resp);
                }
                DatabaseRequest::AddLobby { lobby, responder } => {
                    let resp = transform_err(self.db_connection.add_lobby(&lobby).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetLobby { id, responder } => {
                    let resp = transform_err(self.db_connection.get_lobby(&id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetOpenLobbies { responder } => {
                    let resp = transform_err(self.db_connection.get_open_lobbies().await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::FillLobby {
                    id,
                    opponent,
                    responder,
                } => {
                    let resp = transform_err(self.db_connection.fill_lobby(&id, &opponent).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::CancelLobby { id, responder } => {
                    let resp = transform_err(self.db_connection.cancel_lobby(&id).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::MarkSettled {
                    id,
                    resolved_side,
                    winner,
                    responder,
                } => {
                    let resp = transform_err(
                        self.db_connection
                            .mark_settled(&id, resolved_side, &winner)
                            .await,
                    );
                    let _ = responder.send(resp);
                }
                DatabaseRequest::AddGameRecord { record, responder } => {
                    let resp = transform_err(self.db_connection.add_game_record(&record).await);
                    let _ = responder.send(resp);
                }
                DatabaseRequest::GetRecordsForUser { name, responder } => {
                    let resp = transform_err(self.db_connection.get_records_for_user(&name).await);
                    let _ = responder.send(resp);
                }
            }
        }
    }
}
