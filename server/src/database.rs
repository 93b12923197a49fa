use chrono::{DateTime, Utc};
use common::{Amount, CoinSide, GameKind, LobbyStatus};
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, Mem};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::sql::{Id, Thing};
use surrealdb::{Connection, Result, Surreal};

/// Balance a fresh account starts with, in minor units.
pub const STARTING_BALANCE: Amount = 100_000;

const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Record {
    #[allow(dead_code)]
    pub id: Thing,
}

pub fn user_thing(name: &str) -> Thing {
    Thing {
        tb: "user".into(),
        id: Id::String(name.into()),
    }
}

pub fn lobby_thing(id: &str) -> Thing {
    Thing {
        tb: "lobby".into(),
        id: Id::String(id.into()),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbUser {
    pub id: Thing,
    pub name: String,
    pub balance: Amount,
}

impl DbUser {
    pub fn new(name: impl Into<String> + Clone, balance: Amount) -> Self {
        Self {
            id: user_thing(&name.clone().into()),
            name: name.into(),
            balance,
        }
    }
}

impl Into<common::User> for DbUser {
    fn into(self) -> common::User {
        common::User {
            name: self.name,
            balance: self.balance,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbLobby {
    pub id: Thing,
    pub creator: Thing,
    pub stake: Amount,
    pub creator_side: CoinSide,
    pub status: LobbyStatus,
    pub opponent: Option<Thing>,
    pub resolved_side: Option<CoinSide>,
    pub winner: Option<Thing>,
    pub created_at: DateTime<Utc>,
}

impl DbLobby {
    pub fn new(creator: &str, stake: Amount, creator_side: CoinSide) -> Self {
        Self {
            id: Thing {
                tb: "lobby".into(),
                id: Id::rand(),
            },
            creator: user_thing(creator),
            stake,
            creator_side,
            status: LobbyStatus::Open,
            opponent: None,
            resolved_side: None,
            winner: None,
            created_at: Utc::now(),
        }
    }
}

impl Into<common::LobbyInfo> for DbLobby {
    fn into(self) -> common::LobbyInfo {
        common::LobbyInfo {
            id: self.id.id.to_raw(),
            creator: self.creator.id.to_raw(),
            stake: self.stake,
            creator_side: self.creator_side,
            status: self.status,
            opponent: self.opponent.map(|user| user.id.to_raw()),
            resolved_side: self.resolved_side,
            winner: self.winner.map(|user| user.id.to_raw()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbGameRecord {
    pub id: Thing,
    pub user: Thing,
    pub game: GameKind,
    pub stake: Amount,
    pub win_chance: u8,
    pub outcome: u8,
    pub won: bool,
    pub payout: Amount,
    pub created_at: DateTime<Utc>,
}

impl DbGameRecord {
    pub fn dice(user: &str, stake: Amount, win_chance: u8, roll: u8, won: bool, payout: Amount) -> Self {
        Self {
            id: Thing {
                tb: "game_result".into(),
                id: Id::rand(),
            },
            user: user_thing(user),
            game: GameKind::Dice,
            stake,
            win_chance,
            outcome: roll,
            won,
            payout,
            created_at: Utc::now(),
        }
    }

    pub fn coin_flip(user: &str, stake: Amount, side: CoinSide, won: bool, payout: Amount) -> Self {
        Self {
            id: Thing {
                tb: "game_result".into(),
                id: Id::rand(),
            },
            user: user_thing(user),
            game: GameKind::CoinFlip,
            stake,
            win_chance: 50,
            outcome: match side {
                CoinSide::Heads => 1,
                CoinSide::Tails => 0,
            },
            won,
            payout,
            created_at: Utc::now(),
        }
    }
}

impl Into<common::GameRecord> for DbGameRecord {
    fn into(self) -> common::GameRecord {
        common::GameRecord {
            game: self.game,
            stake: self.stake,
            win_chance: self.win_chance,
            outcome: self.outcome,
            won: self.won,
            payout: self.payout,
            created_at: self.created_at,
        }
    }
}

pub struct DatabaseConnection<C: Connection> {
    connection: Surreal<C>,
}

impl DatabaseConnection<Client> {
    pub async fn connect(address: &str) -> Option<Self> {
        let db = Surreal::new::<Ws>(address).await.ok()?;

        db.signin(Root {
            username: "root",
            password: "root",
        })
        .await
        .ok()?;

        db.use_ns("casino").use_db("casino").await.ok()?;

        Some(Self { connection: db })
    }
}

impl DatabaseConnection<Db> {
    pub async fn memory() -> Result<Self> {
        let db = Surreal::new::<Mem>(()).await?;
        db.use_ns("casino").use_db("casino").await?;

        Ok(Self { connection: db })
    }
}

impl<C: Connection> DatabaseConnection<C> {
    pub async fn get_user(&self, name: &str) -> Result<Option<DbUser>> {
        self.connection.select(("user", name)).await
    }

    /// Accounts are created on first sight of an identity, seeded with the
    /// starting balance. The identifier itself is trusted as given.
    pub async fn ensure_user(&mut self, name: &str) -> Result<DbUser> {
        if let Some(user) = self.get_user(name).await? {
            return Ok(user);
        }
        let user = DbUser::new(name, STARTING_BALANCE);
        let _: Option<Record> = self
            .connection
            .create(("user", name))
            .content(&user)
            .await?;
        Ok(user)
    }

    /// Adds `delta` to the account balance, refusing to drive it below zero.
    /// The check and the mutation are one conditional statement, so two
    /// concurrent wagers cannot both spend the same funds. Returns the new
    /// balance, or None if the account could not cover the delta.
    pub async fn apply_balance_delta(&mut self, name: &str, delta: i64) -> Result<Option<Amount>> {
        let updated: Vec<DbUser> = self
            .connection
            .query("UPDATE $user SET balance += $delta WHERE balance + $delta >= 0 RETURN AFTER;")
            .bind(("user", user_thing(name)))
            .bind(("delta", delta))
            .await?
            .take(0)?;
        Ok(updated.into_iter().next().map(|user| user.balance))
    }

    /// Moves the stake from loser to winner. Returns false without touching
    /// either balance when the loser cannot cover the stake (possible because
    /// stakes are not escrowed at lobby creation). If the winning credit
    /// does not land after the debit succeeded, the debit is compensated.
    pub async fn transfer_stake(&mut self, winner: &str, loser: &str, stake: Amount) -> Result<bool> {
        let debited = self.apply_balance_delta(loser, -(stake as i64)).await?;
        if debited.is_none() {
            return Ok(false);
        }
        match self.apply_balance_delta(winner, stake as i64).await {
            Ok(Some(_)) => Ok(true),
            // no winner row was updated; undo the debit so nothing moved
            Ok(None) => {
                self.apply_balance_delta(loser, stake as i64).await?;
                Ok(false)
            }
            Err(e) => {
                self.apply_balance_delta(loser, stake as i64).await?;
                Err(e)
            }
        }
    }

    pub async fn add_lobby(&mut self, lobby: &DbLobby) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create(("lobby", lobby.id.id.to_raw()))
            .content(lobby)
            .await?;
        Ok(())
    }

    pub async fn get_lobby(&self, lobby_id: &Thing) -> Result<Option<DbLobby>> {
        self.connection.select(lobby_id).await
    }

    pub async fn get_open_lobbies(&self) -> Result<Vec<DbLobby>> {
        self.connection
            .query("SELECT * FROM lobby WHERE status = $open ORDER BY created_at DESC;")
            .bind(("open", LobbyStatus::Open))
            .await?
            .take(0)
    }

    /// Compare-and-set OPEN -> FILLED. Only the first of two racing joins
    /// gets the updated row back; the other sees None.
    pub async fn fill_lobby(&mut self, lobby_id: &Thing, opponent: &str) -> Result<Option<DbLobby>> {
        let updated: Vec<DbLobby> = self
            .connection
            .query("UPDATE $lobby SET status = $filled, opponent = $opponent WHERE status = $open RETURN AFTER;")
            .bind(("lobby", lobby_id))
            .bind(("filled", LobbyStatus::Filled))
            .bind(("opponent", user_thing(opponent)))
            .bind(("open", LobbyStatus::Open))
            .await?
            .take(0)?;
        Ok(updated.into_iter().next())
    }

    /// Compare-and-set OPEN -> CANCELLED.
    pub async fn cancel_lobby(&mut self, lobby_id: &Thing) -> Result<Option<DbLobby>> {
        let updated: Vec<DbLobby> = self
            .connection
            .query("UPDATE $lobby SET status = $cancelled WHERE status = $open RETURN AFTER;")
            .bind(("lobby", lobby_id))
            .bind(("cancelled", LobbyStatus::Cancelled))
            .bind(("open", LobbyStatus::Open))
            .await?
            .take(0)?;
        Ok(updated.into_iter().next())
    }

    /// Compare-and-set FILLED -> SETTLED. This is the exactly-once guard for
    /// settlement: balance transfers only happen for the caller that wins
    /// this transition.
    pub async fn mark_settled(
        &mut self,
        lobby_id: &Thing,
        resolved_side: CoinSide,
        winner: &str,
    ) -> Result<Option<DbLobby>> {
        let updated: Vec<DbLobby> = self
            .connection
            .query("UPDATE $lobby SET status = $settled, resolved_side = $side, winner = $winner WHERE status = $filled RETURN AFTER;")
            .bind(("lobby", lobby_id))
            .bind(("settled", LobbyStatus::Settled))
            .bind(("side", resolved_side))
            .bind(("winner", user_thing(winner)))
            .bind(("filled", LobbyStatus::Filled))
            .await?
            .take(0)?;
        Ok(updated.into_iter().next())
    }

    pub async fn add_game_record(&mut self, record: &DbGameRecord) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create(("game_result", record.id.id.to_raw()))
            .content(record)
            .await?;
        Ok(())
    }

    pub async fn get_records_for_user(&self, name: &str) -> Result<Vec<DbGameRecord>> {
        self.connection
            .query("SELECT * FROM game_result WHERE user = $user ORDER BY created_at DESC LIMIT $limit;")
            .bind(("user", user_thing(name)))
            .bind(("limit", HISTORY_LIMIT))
            .await?
            .take(0)
    }
}
