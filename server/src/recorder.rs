use common::{GameError, GameRecord};
use tokio::sync::{mpsc, oneshot};

use crate::database_manager::DatabaseRequest;
use crate::database::DbGameRecord;

/// Appends history entries. History is display-only and best-effort: a failed
/// append is logged and swallowed, it must never roll back the wager that
/// produced it.
#[derive(Clone)]
pub struct ResultRecorder {
    database_requester: mpsc::Sender<DatabaseRequest>,
}

impl ResultRecorder {
    pub fn new(database_requester: mpsc::Sender<DatabaseRequest>) -> Self {
        Self { database_requester }
    }

    pub async fn record(&self, record: DbGameRecord) {
        let (tx, rx) = oneshot::channel();
        let send = self
            .database_requester
            .send(DatabaseRequest::AddGameRecord {
                record,
                responder: tx,
            })
            .await;
        if send.is_err() {
            tracing::warn!("game record dropped: database actor is gone");
            return;
        }
        match rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to append game record"),
            Err(e) => tracing::warn!(error = %e, "failed to append game record"),
        }
    }

    pub async fn recent_for(&self, name: &str) -> Result<Vec<GameRecord>, GameError> {
        let (tx, rx) = oneshot::channel();
        self.database_requester
            .send(DatabaseRequest::GetRecordsForUser {
                name: name.into(),
                responder: tx,
            })
            .await
            .map_err(GameError::storage)?;
        match rx.await {
            Ok(Ok(records)) => Ok(records.into_iter().map(Into::into).collect()),
            Ok(Err(e)) => Err(GameError::storage(e)),
            Err(e) => Err(GameError::storage(e)),
        }
    }
}
