use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::{Document, doc},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{MongoLobbyDocument, MongoPlayerDocument, doc_code},
};
use crate::dao::{
    models::{LobbyEntity, LobbyPhaseEntity, LobbySessionEntity, PlayerEntity, WriteOutcome},
    session_store::SessionStore,
    storage::StorageResult,
};

const LOBBY_COLLECTION_NAME: &str = "lobbies";

/// Session store keeping one MongoDB document per lobby.
///
/// Single-document writes are atomic in MongoDB, so filtering a replace on the
/// stored `version` is enough to make [`SessionStore::commit`] conditional.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

/// Update document setting `fields` and bumping the lobby version.
fn versioned_set(fields: Document) -> Document {
    doc! {
        "$set": fields,
        "$inc": { "version": 1_i64 },
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoLobbyDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoLobbyDocument>(LOBBY_COLLECTION_NAME)
    }

    async fn find_document(&self, code: &str) -> MongoResult<Option<MongoLobbyDocument>> {
        self.collection()
            .await
            .find_one(doc_code(code))
            .await
            .map_err(|source| MongoDaoError::LoadLobby {
                code: code.to_owned(),
                source,
            })
    }

    /// Run a guarded update, telling a missing lobby apart from a failed guard.
    async fn guarded_update(
        &self,
        code: &str,
        filter: Document,
        update: Document,
    ) -> MongoResult<WriteOutcome> {
        let result = self
            .collection()
            .await
            .update_one(filter, update)
            .await
            .map_err(|source| MongoDaoError::SaveLobby {
                code: code.to_owned(),
                source,
            })?;

        if result.matched_count > 0 {
            return Ok(WriteOutcome::Applied);
        }
        match self.find_document(code).await? {
            Some(_) => Ok(WriteOutcome::Rejected),
            None => Ok(WriteOutcome::Missing),
        }
    }

    async fn create_lobby(&self, lobby: LobbyEntity, host: PlayerEntity) -> MongoResult<()> {
        let code = lobby.code.clone();
        let document: MongoLobbyDocument = LobbySessionEntity {
            lobby,
            players: vec![host],
        }
        .into();

        match self.collection().await.insert_one(&document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(MongoDaoError::Duplicate { code }),
            Err(source) => Err(MongoDaoError::SaveLobby { code, source }),
        }
    }

    async fn merge_player(&self, code: &str, player: PlayerEntity) -> MongoResult<WriteOutcome> {
        let path = format!("players.{}", player.id);

        let mut rename = Document::new();
        rename.insert(format!("{path}.name"), player.name.clone());
        let mut existing = doc_code(code);
        existing.insert(path.clone(), doc! { "$exists": true });
        if self
            .guarded_update(code, existing.clone(), versioned_set(rename.clone()))
            .await?
            == WriteOutcome::Applied
        {
            return Ok(WriteOutcome::Applied);
        }

        let mut insert = Document::new();
        insert.insert(path.clone(), MongoPlayerDocument::from(&player).to_document());
        let closed_phases: Vec<&str> = [LobbyPhaseEntity::Finale, LobbyPhaseEntity::Ended]
            .into_iter()
            .map(LobbyPhaseEntity::as_str)
            .collect();
        let mut absent = doc_code(code);
        absent.insert(path, doc! { "$exists": false });
        absent.insert("phase", doc! { "$nin": closed_phases });
        absent.insert(
            "$nor",
            vec![doc! { "phase": LobbyPhaseEntity::Reveal.as_str(), "reveal_stage": "finale" }],
        );
        match self.guarded_update(code, absent, versioned_set(insert)).await? {
            // Either a concurrent join of the same identity won, or the
            // finale closed the roster and the rename is rejected too.
            WriteOutcome::Rejected => {
                self.guarded_update(code, existing, versioned_set(rename))
                    .await
            }
            outcome => Ok(outcome),
        }
    }

    async fn record_vote(
        &self,
        code: &str,
        round: u32,
        voter_id: &str,
        target_id: &str,
    ) -> MongoResult<WriteOutcome> {
        let open_phases: Vec<&str> = [LobbyPhaseEntity::Playing, LobbyPhaseEntity::Voting]
            .into_iter()
            .map(LobbyPhaseEntity::as_str)
            .collect();
        let mut filter = doc_code(code);
        filter.insert("round", i64::from(round));
        filter.insert("phase", doc! { "$in": open_phases });

        let mut vote = Document::new();
        vote.insert(format!("votes.{voter_id}"), target_id);
        self.guarded_update(code, filter, versioned_set(vote)).await
    }

    async fn update_settings(&self, code: &str, round_seconds: u32) -> MongoResult<WriteOutcome> {
        self.guarded_update(
            code,
            doc_code(code),
            versioned_set(doc! { "round_seconds": i64::from(round_seconds) }),
        )
        .await
    }

    async fn commit(&self, expected_version: u64, session: LobbySessionEntity) -> MongoResult<u64> {
        let code = session.lobby.code.clone();
        let version = expected_version + 1;
        let mut document: MongoLobbyDocument = session.into();
        document.version = i64::try_from(version).unwrap_or(i64::MAX);

        let mut filter = doc_code(&code);
        filter.insert("version", i64::try_from(expected_version).unwrap_or(i64::MAX));

        let result = self
            .collection()
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::SaveLobby {
                code: code.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::VersionMismatch {
                code,
                expected: expected_version,
            });
        }
        Ok(version)
    }
}

impl SessionStore for MongoSessionStore {
    fn find_lobby(&self, code: String) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.find_document(&code).await?;
            Ok(document.map(|document| document.lobby()))
        })
    }

    fn find_player(
        &self,
        code: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.find_document(&code).await?;
            Ok(document.and_then(|document| document.player(&player_id)))
        })
    }

    fn list_players(&self, code: String) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.find_document(&code).await?;
            Ok(document
                .map(|document| document.players())
                .unwrap_or_default())
        })
    }

    fn load_snapshot(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<LobbySessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.find_document(&code).await?;
            Ok(document.map(Into::into))
        })
    }

    fn create_lobby(
        &self,
        lobby: LobbyEntity,
        host: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_lobby(lobby, host).await.map_err(Into::into) })
    }

    fn merge_player(
        &self,
        code: String,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.merge_player(&code, player).await.map_err(Into::into) })
    }

    fn record_vote(
        &self,
        code: String,
        round: u32,
        voter_id: String,
        target_id: String,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .record_vote(&code, round, &voter_id, &target_id)
                .await
                .map_err(Into::into)
        })
    }

    fn update_settings(
        &self,
        code: String,
        round_seconds: u32,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_settings(&code, round_seconds)
                .await
                .map_err(Into::into)
        })
    }

    fn commit(
        &self,
        expected_version: u64,
        session: LobbySessionEntity,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .commit(expected_version, session)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
