use std::sync::Arc;

use clap::Parser;
use surrealdb::Connection;
use tokio::join;
use tokio::sync::{broadcast, mpsc};

use server::connection_manager::{handle_listen_server, AppContext};
use server::database::DatabaseConnection;
use server::database_manager::DatabaseManager;
use server::ledger::Ledger;
use server::lobby_manager::{drive_settlement, LobbyManager};
use server::recorder::ResultRecorder;
use server::rng::{RandomnessSource, ThreadRandomness};

#[derive(Parser, Debug)]
struct Args {
    /// Address to serve websocket clients on
    #[arg(long, default_value = "127.0.0.1:6379")]
    bind: String,

    /// Address of the SurrealDB instance
    #[arg(long, default_value = "127.0.0.1:8000")]
    database: String,

    /// Run against an embedded in-memory database instead of a remote one
    #[arg(long)]
    embedded: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if args.embedded {
        let database = DatabaseConnection::memory().await?;
        run(database, args).await
    } else {
        let database = DatabaseConnection::connect(&args.database)
            .await
            .ok_or(anyhow::anyhow!("could not reach the database"))?;
        run(database, args).await
    }
}

async fn run<C: Connection>(database: DatabaseConnection<C>, args: Args) -> anyhow::Result<()> {
    let (db_tx, db_rx) = mpsc::channel(32);
    let mut db_manager = DatabaseManager::new(database, db_rx);

    let db_task = tokio::spawn(async move {
        db_manager.manage().await;
    });

    let (events_tx, _) = broadcast::channel(64);
    let ledger = Ledger::new(db_tx.clone());
    let recorder = ResultRecorder::new(db_tx.clone());
    let randomness: Arc<dyn RandomnessSource> = Arc::new(ThreadRandomness);

    let (lobby_tx, lobby_rx) = mpsc::channel(32);
    let mut lobby_manager = LobbyManager::new(
        lobby_rx,
        db_tx.clone(),
        ledger.clone(),
        recorder.clone(),
        randomness.clone(),
        events_tx.clone(),
    );

    let lobby_task = tokio::spawn(async move {
        lobby_manager.manage().await;
    });

    let settlement_task = tokio::spawn(drive_settlement(events_tx.subscribe(), lobby_tx.clone()));

    let ctx = AppContext {
        database_requester: db_tx,
        lobby_requester: lobby_tx,
        ledger,
        recorder,
        randomness,
        events: events_tx,
    };
    let listen_server_task = tokio::spawn(handle_listen_server(args.bind.clone(), ctx));

    let (res1, res2, res3, res4) = join!(db_task, lobby_task, settlement_task, listen_server_task);
    res1?;
    res2?;
    res3?;
    res4?;
    Ok(())
}
