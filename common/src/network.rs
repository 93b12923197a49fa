use serde::{Deserialize, Serialize};

use anyhow::bail;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::{Amount, CoinSide, GameError, GameRecord, LobbyEvent, LobbyInfo, WagerReceipt};

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq)]
pub enum Request {
    Login { user: String },
    WhoAmI,
    Balance,
    PlaceWager { stake: Amount, win_chance: u8 },
    CreateLobby { stake: Amount, side: CoinSide },
    JoinLobby { lobby_id: String },
    CancelLobby { lobby_id: String },
    OpenLobbies,
    History,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Response {
    SuccessfulLogin { username: String, balance: Amount },
    WhoAmI(String),
    Balance(Amount),
    WagerResolved(WagerReceipt),
    LobbyCreated(LobbyInfo),
    LobbyJoined(LobbyInfo),
    LobbyCancelled(LobbyInfo),
    OpenLobbies(Vec<LobbyInfo>),
    History(Vec<GameRecord>),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Packet {
    RequestPacket(Request),
    ResponsePacket(Response),
    EventPacket(LobbyEvent),
    Error(GameError),
}

pub struct Connection {
    connection: TungsteniteWebSocket,
}

impl Connection {
    pub async fn from_tcp_stream(connection: TcpStream) -> anyhow::Result<Self> {
        let ws = TungsteniteWebSocket::accept(connection).await?;

        Ok(Self { connection: ws })
    }

    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let ws = TungsteniteWebSocket::connect(&format!("ws://{}", address), stream).await?;

        Ok(Self { connection: ws })
    }

    pub async fn read(&mut self) -> anyhow::Result<Packet> {
        Ok(rmp_serde::from_slice(&self.connection.read().await?)?)
    }

    pub async fn send(&mut self, data: Packet) -> anyhow::Result<()> {
        self.connection.write_all(&rmp_serde::to_vec(&data)?).await
    }
}

struct TungsteniteWebSocket {
    socket: WebSocketStream<TcpStream>,
}

impl TungsteniteWebSocket {
    async fn accept(stream: TcpStream) -> anyhow::Result<Self> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        Ok(Self { socket: ws_stream })
    }

    async fn connect(url: &str, stream: TcpStream) -> anyhow::Result<Self> {
        let (ws_stream, _) = tokio_tungstenite::client_async(url, stream).await?;
        Ok(Self { socket: ws_stream })
    }

    async fn read(&mut self) -> anyhow::Result<Vec<u8>> {
        loop {
            let message = self
                .socket
                .next()
                .await
                .ok_or(anyhow::anyhow!("connection closed"))??;
            match message {
                Message::Binary(data) => return Ok(data),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => bail!("connection closed"),
                _ => bail!("incorrect data type received"),
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> anyhow::Result<()> {
        Ok(self.socket.send(Message::Binary(buf.to_vec())).await?)
    }
}
