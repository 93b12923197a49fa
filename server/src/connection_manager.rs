use std::sync::Arc;

use anyhow::bail;
use common::network::{Connection, Packet, Request, Response};
use common::{GameError, LobbyEvent, WagerReceipt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::database::DbGameRecord;
use crate::database_manager::DatabaseRequest;
use crate::ledger::Ledger;
use crate::lobby_manager::LobbyRequest;
use crate::recorder::ResultRecorder;
use crate::resolver;
use crate::rng::RandomnessSource;

/// Everything a client connection needs to reach the engine.
#[derive(Clone)]
pub struct AppContext {
    pub database_requester: mpsc::Sender<DatabaseRequest>,
    pub lobby_requester: mpsc::Sender<LobbyRequest>,
    pub ledger: Ledger,
    pub recorder: ResultRecorder,
    pub randomness: Arc<dyn RandomnessSource>,
    pub events: broadcast::Sender<LobbyEvent>,
}

pub async fn handle_listen_server(bind: String, ctx: AppContext) {
    let listener = TcpListener::bind(&bind).await.unwrap();
    tracing::info!(%bind, "listening for clients");

    loop {
        let (stream, _) = listener.accept().await.unwrap();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            match Connection::from_tcp_stream(stream).await {
                Ok(connection) => handle_connection(connection, ctx).await,
                Err(e) => tracing::debug!(error = %e, "websocket handshake failed"),
            }
        });
    }
}

async fn handle_connection(mut connection: Connection, ctx: AppContext) {
    let user = handle_login(&mut connection, &ctx).await;
    if let Ok(username) = user {
        match handle_client(username, &mut connection, ctx).await {
            Ok(()) => {}
            Err(e) => {
                tracing::debug!(error = %e, "client connection ended");
                connection.send(Packet::Error(GameError::storage(e))).await.ok();
            }
        }
    } else {
        connection
            .send(Packet::Error(GameError::UnknownUser))
            .await
            .ok();
    }
}

async fn handle_login(connection: &mut Connection, ctx: &AppContext) -> anyhow::Result<String> {
    let packet = connection.read().await?;
    if let Packet::RequestPacket(Request::Login { user }) = packet {
        let (resp_tx, resp_rx) = oneshot::channel();
        ctx.database_requester
            .send(DatabaseRequest::EnsureUser {
                name: user,
                responder: resp_tx,
            })
            .await?;
        let user = resp_rx.await??;
        connection
            .send(Packet::ResponsePacket(Response::SuccessfulLogin {
                username: user.name.clone(),
                balance: user.balance,
            }))
            .await?;
        Ok(user.name)
    } else {
        bail!("invalid request at login: {:?}", packet);
    }
}

async fn handle_client(
    username: String,
    connection: &mut Connection,
    ctx: AppContext,
) -> anyhow::Result<()> {
    let mut events = ctx.events.subscribe();
    loop {
        tokio::select! {
            packet = connection.read() => {
                let packet = match packet {
                    Ok(packet) => packet,
                    Err(e) => {
                        // client went away
                        tracing::debug!(%username, error = %e, "connection closed");
                        return Ok(());
                    }
                };
                let request = match packet {
                    Packet::RequestPacket(Request::Login { .. }) => {
                        connection.send(Packet::Error(GameError::storage("already logged in"))).await?;
                        bail!("attempted re-login - denied");
                    }
                    Packet::RequestPacket(request) => request,
                    other => bail!("incorrect packet type: {:?}", other),
                };
                match handle_request(&username, request, &ctx).await {
                    Ok(response) => connection.send(Packet::ResponsePacket(response)).await?,
                    // recoverable game errors go back verbatim and the
                    // session carries on
                    Err(e) => connection.send(Packet::Error(e)).await?,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => connection.send(Packet::EventPacket(event)).await?,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

async fn handle_request(
    username: &str,
    request: Request,
    ctx: &AppContext,
) -> Result<Response, GameError> {
    match request {
        Request::Login { .. } => unreachable!("handled by the caller"),
        Request::WhoAmI => Ok(Response::WhoAmI(username.into())),
        Request::Balance => Ok(Response::Balance(ctx.ledger.balance_of(username).await?)),
        Request::PlaceWager { stake, win_chance } => {
            let balance = ctx.ledger.balance_of(username).await?;
            resolver::validate(stake, balance, win_chance)?;

            let roll = ctx.randomness.draw_roll();
            let outcome = resolver::resolve(stake, win_chance, roll);
            let balance = ctx.ledger.apply_delta(username, outcome.net).await?;
            ctx.recorder
                .record(DbGameRecord::dice(
                    username,
                    stake,
                    win_chance,
                    roll,
                    outcome.won,
                    outcome.payout,
                ))
                .await;

            Ok(Response::WagerResolved(WagerReceipt {
                roll,
                won: outcome.won,
                payout: outcome.payout,
                balance,
            }))
        }
        Request::CreateLobby { stake, side } => {
            let (tx, rx) = oneshot::channel();
            ctx.lobby_requester
                .send(LobbyRequest::Create {
                    creator: username.into(),
                    stake,
                    side,
                    responder: tx,
                })
                .await
                .map_err(GameError::storage)?;
            Ok(Response::LobbyCreated(recv(rx).await?))
        }
        Request::JoinLobby { lobby_id } => {
            let (tx, rx) = oneshot::channel();
            ctx.lobby_requester
                .send(LobbyRequest::Join {
                    lobby_id,
                    joiner: username.into(),
                    responder: tx,
                })
                .await
                .map_err(GameError::storage)?;
            Ok(Response::LobbyJoined(recv(rx).await?))
        }
        Request::CancelLobby { lobby_id } => {
            let (tx, rx) = oneshot::channel();
            ctx.lobby_requester
                .send(LobbyRequest::Cancel {
                    lobby_id,
                    requester: username.into(),
                    responder: tx,
                })
                .await
                .map_err(GameError::storage)?;
            Ok(Response::LobbyCancelled(recv(rx).await?))
        }
        Request::OpenLobbies => {
            let (tx, rx) = oneshot::channel();
            ctx.lobby_requester
                .send(LobbyRequest::ListOpen { responder: tx })
                .await
                .map_err(GameError::storage)?;
            Ok(Response::OpenLobbies(recv(rx).await?))
        }
        Request::History => Ok(Response::History(ctx.recorder.recent_for(username).await?)),
    }
}

async fn recv<T>(rx: oneshot::Receiver<Result<T, GameError>>) -> Result<T, GameError> {
    match rx.await {
        Ok(result) => result,
        Err(e) => Err(GameError::storage(e)),
    }
}
