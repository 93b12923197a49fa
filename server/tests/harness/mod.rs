#![allow(dead_code)]

use std::sync::Arc;

use common::{Amount, CoinSide, GameError, LobbyEvent, LobbyInfo};
use tokio::sync::{broadcast, mpsc, oneshot};

use server::database::{DatabaseConnection, DbLobby, DbUser};
use server::database_manager::{DatabaseManager, DatabaseRequest};
use server::ledger::Ledger;
use server::lobby_manager::{LobbyManager, LobbyRequest};
use server::recorder::ResultRecorder;
use server::rng::RandomnessSource;

/// Deterministic stand-in for the production randomness source.
pub struct FixedRandomness {
    pub roll: u8,
    pub side: CoinSide,
}

impl RandomnessSource for FixedRandomness {
    fn draw_roll(&self) -> u8 {
        self.roll
    }

    fn draw_side(&self) -> CoinSide {
        self.side
    }
}

pub struct TestApp {
    pub db: mpsc::Sender<DatabaseRequest>,
    pub lobbies: mpsc::Sender<LobbyRequest>,
    pub ledger: Ledger,
    pub recorder: ResultRecorder,
    pub events: broadcast::Sender<LobbyEvent>,
}

/// Spins up the database and lobby actors against an in-memory engine.
pub async fn spawn_app(randomness: Arc<dyn RandomnessSource>) -> TestApp {
    let database = DatabaseConnection::memory().await.unwrap();
    let (db_tx, db_rx) = mpsc::channel(32);
    let mut db_manager = DatabaseManager::new(database, db_rx);
    tokio::spawn(async move {
        db_manager.manage().await;
    });

    let (events_tx, _) = broadcast::channel(64);
    let ledger = Ledger::new(db_tx.clone());
    let recorder = ResultRecorder::new(db_tx.clone());

    let (lobby_tx, lobby_rx) = mpsc::channel(32);
    let mut lobby_manager = LobbyManager::new(
        lobby_rx,
        db_tx.clone(),
        ledger.clone(),
        recorder.clone(),
        randomness,
        events_tx.clone(),
    );
    tokio::spawn(async move {
        lobby_manager.manage().await;
    });

    TestApp {
        db: db_tx,
        lobbies: lobby_tx,
        ledger,
        recorder,
        events: events_tx,
    }
}

impl TestApp {
    pub async fn ensure_user(&self, name: &str) -> DbUser {
        let (tx, rx) = oneshot::channel();
        self.db
            .send(DatabaseRequest::EnsureUser {
                name: name.into(),
                responder: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap().unwrap()
    }

    pub async fn get_lobby(&self, lobby_id: &str) -> Option<DbLobby> {
        let (tx, rx) = oneshot::channel();
        self.db
            .send(DatabaseRequest::GetLobby {
                id: server::database::lobby_thing(lobby_id),
                responder: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap().unwrap()
    }

    pub async fn create_lobby(
        &self,
        creator: &str,
        stake: Amount,
        side: CoinSide,
    ) -> Result<LobbyInfo, GameError> {
        let (tx, rx) = oneshot::channel();
        self.lobbies
            .send(LobbyRequest::Create {
                creator: creator.into(),
                stake,
                side,
                responder: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    pub async fn join_lobby(&self, lobby_id: &str, joiner: &str) -> Result<LobbyInfo, GameError> {
        let (tx, rx) = oneshot::channel();
        self.lobbies
            .send(LobbyRequest::Join {
                lobby_id: lobby_id.into(),
                joiner: joiner.into(),
                responder: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    pub async fn cancel_lobby(
        &self,
        lobby_id: &str,
        requester: &str,
    ) -> Result<LobbyInfo, GameError> {
        let (tx, rx) = oneshot::channel();
        self.lobbies
            .send(LobbyRequest::Cancel {
                lobby_id: lobby_id.into(),
                requester: requester.into(),
                responder: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    pub async fn list_open(&self) -> Vec<LobbyInfo> {
        let (tx, rx) = oneshot::channel();
        self.lobbies
            .send(LobbyRequest::ListOpen { responder: tx })
            .await
            .unwrap();
        rx.await.unwrap().unwrap()
    }

    pub async fn settle_lobby(&self, lobby_id: &str) -> Result<(), GameError> {
        let (tx, rx) = oneshot::channel();
        self.lobbies
            .send(LobbyRequest::Settle {
                lobby_id: lobby_id.into(),
                responder: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap()
    }
}
