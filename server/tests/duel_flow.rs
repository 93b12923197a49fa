mod harness;

use std::sync::Arc;
use std::time::Duration;

use common::{CoinSide, GameError, GameKind, LobbyStatus};
use harness::{spawn_app, FixedRandomness, TestApp};
use server::database::STARTING_BALANCE;
use server::database_manager::DatabaseRequest;
use server::lobby_manager::drive_settlement;
use tokio::sync::oneshot;

fn tails_randomness() -> Arc<FixedRandomness> {
    Arc::new(FixedRandomness {
        roll: 1,
        side: CoinSide::Tails,
    })
}

async fn app_with_users(users: &[&str]) -> TestApp {
    let app = spawn_app(tails_randomness()).await;
    for user in users {
        app.ensure_user(user).await;
    }
    app
}

#[tokio::test]
async fn settlement_moves_the_stake_to_the_opponent() {
    // creator picks heads, the coin lands tails, so the opponent wins
    let app = app_with_users(&["creator", "opponent"]).await;
    let lobby = app
        .create_lobby("creator", 5_000, CoinSide::Heads)
        .await
        .unwrap();
    app.join_lobby(&lobby.id, "opponent").await.unwrap();
    app.settle_lobby(&lobby.id).await.unwrap();

    assert_eq!(
        app.ledger.balance_of("creator").await.unwrap(),
        STARTING_BALANCE - 5_000
    );
    assert_eq!(
        app.ledger.balance_of("opponent").await.unwrap(),
        STARTING_BALANCE + 5_000
    );

    let stored = app.get_lobby(&lobby.id).await.unwrap();
    assert_eq!(stored.status, LobbyStatus::Settled);
    assert_eq!(stored.resolved_side, Some(CoinSide::Tails));
    assert_eq!(stored.winner.unwrap().id.to_raw(), "opponent");
}

#[tokio::test]
async fn settled_duel_conserves_money() {
    let app = app_with_users(&["p1", "p2"]).await;
    let lobby = app.create_lobby("p1", 2_000, CoinSide::Tails).await.unwrap();
    app.join_lobby(&lobby.id, "p2").await.unwrap();
    app.settle_lobby(&lobby.id).await.unwrap();

    let total = app.ledger.balance_of("p1").await.unwrap()
        + app.ledger.balance_of("p2").await.unwrap();
    assert_eq!(total, 2 * STARTING_BALANCE);
}

#[tokio::test]
async fn second_settlement_is_refused_and_balances_move_once() {
    let app = app_with_users(&["creator", "opponent"]).await;
    let lobby = app
        .create_lobby("creator", 5_000, CoinSide::Heads)
        .await
        .unwrap();
    app.join_lobby(&lobby.id, "opponent").await.unwrap();

    app.settle_lobby(&lobby.id).await.unwrap();
    let err = app.settle_lobby(&lobby.id).await.unwrap_err();
    assert_eq!(err, GameError::AlreadySettled);

    assert_eq!(
        app.ledger.balance_of("creator").await.unwrap(),
        STARTING_BALANCE - 5_000
    );
    assert_eq!(
        app.ledger.balance_of("opponent").await.unwrap(),
        STARTING_BALANCE + 5_000
    );
}

#[tokio::test]
async fn racing_joins_fill_the_lobby_exactly_once() {
    let app = app_with_users(&["host", "fast", "slow"]).await;
    let lobby = app.create_lobby("host", 2_000, CoinSide::Heads).await.unwrap();

    let mut results = Vec::new();
    for joiner in ["fast", "slow"] {
        let app_lobbies = app.lobbies.clone();
        let lobby_id = lobby.id.clone();
        results.push(tokio::spawn(async move {
            let (tx, rx) = oneshot::channel();
            app_lobbies
                .send(server::lobby_manager::LobbyRequest::Join {
                    lobby_id,
                    joiner: joiner.into(),
                    responder: tx,
                })
                .await
                .unwrap();
            rx.await.unwrap()
        }));
    }

    let mut wins = 0;
    let mut unavailable = 0;
    for task in results {
        match task.await.unwrap() {
            Ok(info) => {
                assert_eq!(info.status, LobbyStatus::Filled);
                wins += 1;
            }
            Err(GameError::LobbyUnavailable) => unavailable += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(unavailable, 1);

    let stored = app.get_lobby(&lobby.id).await.unwrap();
    assert_eq!(stored.status, LobbyStatus::Filled);
}

#[tokio::test]
async fn storage_level_fill_is_compare_and_set() {
    let app = app_with_users(&["host", "a", "b"]).await;
    let lobby = app.create_lobby("host", 1_000, CoinSide::Heads).await.unwrap();
    let id = server::database::lobby_thing(&lobby.id);

    let mut filled = 0;
    for joiner in ["a", "b"] {
        let (tx, rx) = oneshot::channel();
        app.db
            .send(DatabaseRequest::FillLobby {
                id: id.clone(),
                opponent: joiner.into(),
                responder: tx,
            })
            .await
            .unwrap();
        if rx.await.unwrap().unwrap().is_some() {
            filled += 1;
        }
    }
    assert_eq!(filled, 1);

    let stored = app.get_lobby(&lobby.id).await.unwrap();
    assert_eq!(stored.opponent.unwrap().id.to_raw(), "a");
}

#[tokio::test]
async fn zero_stake_lobby_is_rejected() {
    let app = app_with_users(&["host"]).await;
    let err = app
        .create_lobby("host", 0, CoinSide::Heads)
        .await
        .unwrap_err();
    assert_eq!(err, GameError::InvalidStake);
}

#[tokio::test]
async fn stake_above_balance_is_rejected() {
    let app = app_with_users(&["host"]).await;
    let err = app
        .create_lobby("host", STARTING_BALANCE + 1, CoinSide::Heads)
        .await
        .unwrap_err();
    assert_eq!(err, GameError::InsufficientFunds);
}

#[tokio::test]
async fn creators_cannot_join_their_own_lobby() {
    let app = app_with_users(&["host"]).await;
    let lobby = app.create_lobby("host", 1_000, CoinSide::Heads).await.unwrap();
    let err = app.join_lobby(&lobby.id, "host").await.unwrap_err();
    assert_eq!(err, GameError::SelfJoinNotAllowed);
}

#[tokio::test]
async fn joiner_must_cover_the_stake() {
    let app = app_with_users(&["host", "poor"]).await;
    let lobby = app.create_lobby("host", 5_000, CoinSide::Heads).await.unwrap();

    // leave "poor" with less than the stake
    app.ledger
        .apply_delta("poor", -(STARTING_BALANCE as i64) + 100)
        .await
        .unwrap();

    let err = app.join_lobby(&lobby.id, "poor").await.unwrap_err();
    assert_eq!(err, GameError::InsufficientFunds);
}

#[tokio::test]
async fn only_the_creator_may_cancel() {
    let app = app_with_users(&["host", "other"]).await;
    let lobby = app.create_lobby("host", 1_000, CoinSide::Heads).await.unwrap();

    let err = app.cancel_lobby(&lobby.id, "other").await.unwrap_err();
    assert_eq!(err, GameError::NotOwner);

    let cancelled = app.cancel_lobby(&lobby.id, "host").await.unwrap();
    assert_eq!(cancelled.status, LobbyStatus::Cancelled);

    // cancelled lobbies are gone for joiners and for a second cancel
    let err = app.join_lobby(&lobby.id, "other").await.unwrap_err();
    assert_eq!(err, GameError::LobbyUnavailable);
    let err = app.cancel_lobby(&lobby.id, "host").await.unwrap_err();
    assert_eq!(err, GameError::LobbyUnavailable);
}

#[tokio::test]
async fn open_lobby_listing_tracks_lifecycle() {
    let app = app_with_users(&["host", "joiner"]).await;
    assert!(app.list_open().await.is_empty());

    let first = app.create_lobby("host", 1_000, CoinSide::Heads).await.unwrap();
    let second = app.create_lobby("host", 2_000, CoinSide::Tails).await.unwrap();
    assert_eq!(app.list_open().await.len(), 2);

    app.join_lobby(&first.id, "joiner").await.unwrap();
    app.cancel_lobby(&second.id, "host").await.unwrap();
    assert!(app.list_open().await.is_empty());
}

#[tokio::test]
async fn broke_loser_settles_without_minting_money() {
    let app = app_with_users(&["creator", "opponent"]).await;
    let lobby = app
        .create_lobby("creator", 5_000, CoinSide::Heads)
        .await
        .unwrap();
    app.join_lobby(&lobby.id, "opponent").await.unwrap();

    // the stake was never escrowed, so the creator can go broke before
    // settlement; tails means the creator is the loser here
    app.ledger
        .apply_delta("creator", -(STARTING_BALANCE as i64) + 1_000)
        .await
        .unwrap();

    app.settle_lobby(&lobby.id).await.unwrap();

    assert_eq!(app.ledger.balance_of("creator").await.unwrap(), 1_000);
    assert_eq!(
        app.ledger.balance_of("opponent").await.unwrap(),
        STARTING_BALANCE
    );
    let stored = app.get_lobby(&lobby.id).await.unwrap();
    assert_eq!(stored.status, LobbyStatus::Settled);

    // history must agree with the ledger: nothing was paid out
    let winner_history = app.recorder.recent_for("opponent").await.unwrap();
    assert_eq!(winner_history.len(), 1);
    assert!(winner_history[0].won);
    assert_eq!(winner_history[0].payout, 0);
    let loser_history = app.recorder.recent_for("creator").await.unwrap();
    assert_eq!(loser_history.len(), 1);
    assert!(!loser_history[0].won);
    assert_eq!(loser_history[0].payout, 0);
}

#[tokio::test]
async fn cancelled_lobbies_cannot_be_settled() {
    let app = app_with_users(&["host"]).await;
    let lobby = app.create_lobby("host", 1_000, CoinSide::Heads).await.unwrap();
    app.cancel_lobby(&lobby.id, "host").await.unwrap();

    let err = app.settle_lobby(&lobby.id).await.unwrap_err();
    assert_eq!(err, GameError::LobbyUnavailable);
    assert_eq!(
        app.ledger.balance_of("host").await.unwrap(),
        STARTING_BALANCE
    );
}

#[tokio::test]
async fn settlement_writes_one_record_per_participant() {
    let app = app_with_users(&["creator", "opponent"]).await;
    let lobby = app
        .create_lobby("creator", 5_000, CoinSide::Heads)
        .await
        .unwrap();
    app.join_lobby(&lobby.id, "opponent").await.unwrap();
    app.settle_lobby(&lobby.id).await.unwrap();

    let winner_history = app.recorder.recent_for("opponent").await.unwrap();
    assert_eq!(winner_history.len(), 1);
    assert_eq!(winner_history[0].game, GameKind::CoinFlip);
    assert!(winner_history[0].won);
    assert_eq!(winner_history[0].payout, 10_000);

    let loser_history = app.recorder.recent_for("creator").await.unwrap();
    assert_eq!(loser_history.len(), 1);
    assert!(!loser_history[0].won);
    assert_eq!(loser_history[0].payout, 0);
}

#[tokio::test]
async fn filled_events_drive_settlement_without_polling_callers() {
    let app = app_with_users(&["creator", "opponent"]).await;
    tokio::spawn(drive_settlement(
        app.events.subscribe(),
        app.lobbies.clone(),
    ));

    let lobby = app
        .create_lobby("creator", 3_000, CoinSide::Heads)
        .await
        .unwrap();
    app.join_lobby(&lobby.id, "opponent").await.unwrap();

    // the driver settles asynchronously; wait for the terminal state
    let mut settled = false;
    for _ in 0..200 {
        if app.get_lobby(&lobby.id).await.unwrap().status == LobbyStatus::Settled {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(settled, "lobby was never settled by the event driver");

    assert_eq!(
        app.ledger.balance_of("opponent").await.unwrap(),
        STARTING_BALANCE + 3_000
    );
}

#[tokio::test]
async fn every_transition_is_published() {
    let app = app_with_users(&["creator", "opponent"]).await;
    let mut events = app.events.subscribe();

    let lobby = app
        .create_lobby("creator", 1_000, CoinSide::Heads)
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.lobby.id, lobby.id);
    assert_eq!(event.lobby.status, LobbyStatus::Open);

    app.join_lobby(&lobby.id, "opponent").await.unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.lobby.status, LobbyStatus::Filled);

    app.settle_lobby(&lobby.id).await.unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.lobby.status, LobbyStatus::Settled);
    assert_eq!(event.lobby.winner.as_deref(), Some("opponent"));
}
