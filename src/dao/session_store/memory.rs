use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::dao::{
    models::{LobbyEntity, LobbySessionEntity, PlayerEntity, WriteOutcome},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// Process-local session store.
///
/// Each lobby entry is mutated under its map shard lock, which gives the same
/// per-group atomicity the document backends provide. Used by the `memory`
/// backend and by tests.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    lobbies: Arc<DashMap<String, StoredLobby>>,
}

#[derive(Clone)]
struct StoredLobby {
    lobby: LobbyEntity,
    players: IndexMap<String, PlayerEntity>,
}

impl StoredLobby {
    fn session(&self) -> LobbySessionEntity {
        LobbySessionEntity {
            lobby: self.lobby.clone(),
            players: self.players.values().cloned().collect(),
        }
    }

    fn bump(&mut self) {
        self.lobby.version += 1;
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, code: &str, apply: impl FnOnce(&mut StoredLobby) -> bool) -> WriteOutcome {
        match self.lobbies.get_mut(code) {
            Some(mut stored) => {
                if apply(&mut stored) {
                    stored.bump();
                    WriteOutcome::Applied
                } else {
                    WriteOutcome::Rejected
                }
            }
            None => WriteOutcome::Missing,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn find_lobby(&self, code: String) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>> {
        let lobbies = self.lobbies.clone();
        Box::pin(async move { Ok(lobbies.get(&code).map(|stored| stored.lobby.clone())) })
    }

    fn find_player(
        &self,
        code: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let lobbies = self.lobbies.clone();
        Box::pin(async move {
            Ok(lobbies
                .get(&code)
                .and_then(|stored| stored.players.get(&player_id).cloned()))
        })
    }

    fn list_players(&self, code: String) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let lobbies = self.lobbies.clone();
        Box::pin(async move {
            Ok(lobbies
                .get(&code)
                .map(|stored| stored.players.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn load_snapshot(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<LobbySessionEntity>>> {
        let lobbies = self.lobbies.clone();
        Box::pin(async move { Ok(lobbies.get(&code).map(|stored| stored.session())) })
    }

    fn create_lobby(
        &self,
        lobby: LobbyEntity,
        host: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let lobbies = self.lobbies.clone();
        Box::pin(async move {
            match lobbies.entry(lobby.code.clone()) {
                Entry::Occupied(_) => Err(StorageError::conflict(format!(
                    "lobby `{}` already exists",
                    lobby.code
                ))),
                Entry::Vacant(slot) => {
                    let mut players = IndexMap::new();
                    players.insert(host.id.clone(), host);
                    slot.insert(StoredLobby { lobby, players });
                    Ok(())
                }
            }
        })
    }

    fn merge_player(
        &self,
        code: String,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.write(&code, |stored| {
                match stored.players.get_mut(&player.id) {
                    Some(existing) => existing.name = player.name,
                    None if stored.lobby.admits_new_players() => {
                        stored.players.insert(player.id.clone(), player);
                    }
                    None => return false,
                }
                true
            }))
        })
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
            Ok(store.write(&code, |stored| {
                if stored.lobby.round != round || !stored.lobby.phase.voting_open() {
                    return false;
                }
                stored.lobby.votes.insert(voter_id, target_id);
                true
            }))
        })
    }

    fn update_settings(
        &self,
        code: String,
        round_seconds: u32,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.write(&code, |stored| {
                stored.lobby.round_seconds = round_seconds;
                true
            }))
        })
    }

    fn commit(
        &self,
        expected_version: u64,
        session: LobbySessionEntity,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let lobbies = self.lobbies.clone();
        Box::pin(async move {
            let code = session.lobby.code.clone();
            let Some(mut stored) = lobbies.get_mut(&code) else {
                return Err(StorageError::conflict(format!("lobby `{code}` vanished")));
            };
            if stored.lobby.version != expected_version {
                return Err(StorageError::conflict(format!(
                    "lobby `{code}` changed (expected version {expected_version}, found {})",
                    stored.lobby.version
                )));
            }

            let version = expected_version + 1;
            stored.lobby = LobbyEntity {
                version,
                ..session.lobby
            };
            stored.players = session
                .players
                .into_iter()
                .map(|player| (player.id.clone(), player))
                .collect();
            Ok(version)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::dao::models::{LobbyPhaseEntity, RevealStageEntity};

    fn lobby(code: &str) -> LobbyEntity {
        LobbyEntity {
            code: code.into(),
            host_id: "host".into(),
            phase: LobbyPhaseEntity::Lobby,
            reveal_stage: None,
            round: 0,
            round_deadline: None,
            round_seconds: 180,
            votes: IndexMap::new(),
            winner_id: None,
            created_at: UNIX_EPOCH,
            version: 0,
        }
    }

    fn player(id: &str, name: &str) -> PlayerEntity {
        PlayerEntity {
            id: id.into(),
            name: name.into(),
            lives: 3,
            alive: true,
            joined_at: UNIX_EPOCH + Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn create_refuses_taken_codes() {
        let store = MemorySessionStore::new();
        store
            .create_lobby(lobby("ABC123"), player("host", "Host"))
            .await
            .unwrap();
        let err = store
            .create_lobby(lobby("ABC123"), player("other", "Other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let players = store.list_players("ABC123".into()).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, "host");
    }

    #[tokio::test]
    async fn merge_only_renames_existing_players() {
        let store = MemorySessionStore::new();
        store
            .create_lobby(lobby("ABC123"), player("host", "Host"))
            .await
            .unwrap();

        let mut hurt = player("host", "Renamed");
        hurt.lives = 1;
        let outcome = store.merge_player("ABC123".into(), hurt).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);

        let stored = store
            .find_player("ABC123".into(), "host".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((stored.name.as_str(), stored.lives), ("Renamed", 3));

        let missing = store
            .merge_player("NOPE00".into(), player("x", "X"))
            .await
            .unwrap();
        assert_eq!(missing, WriteOutcome::Missing);
    }

    #[tokio::test]
    async fn finale_closes_the_roster_to_newcomers() {
        let store = MemorySessionStore::new();
        let mut finale = lobby("ABC123");
        finale.phase = LobbyPhaseEntity::Reveal;
        finale.reveal_stage = Some(RevealStageEntity::Finale);
        store
            .create_lobby(finale, player("host", "Host"))
            .await
            .unwrap();

        let late = store
            .merge_player("ABC123".into(), player("late", "Late"))
            .await
            .unwrap();
        assert_eq!(late, WriteOutcome::Rejected);

        let rename = store
            .merge_player("ABC123".into(), player("host", "Renamed"))
            .await
            .unwrap();
        assert_eq!(rename, WriteOutcome::Applied);
        assert_eq!(store.list_players("ABC123".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn votes_are_guarded_by_round_and_phase() {
        let store = MemorySessionStore::new();
        let mut playing = lobby("ABC123");
        playing.phase = LobbyPhaseEntity::Playing;
        playing.round = 2;
        store
            .create_lobby(playing, player("host", "Host"))
            .await
            .unwrap();

        let stale = store
            .record_vote("ABC123".into(), 1, "host".into(), "host".into())
            .await
            .unwrap();
        assert_eq!(stale, WriteOutcome::Rejected);

        let fresh = store
            .record_vote("ABC123".into(), 2, "host".into(), "host".into())
            .await
            .unwrap();
        assert_eq!(fresh, WriteOutcome::Applied);

        let lobby = store.find_lobby("ABC123".into()).await.unwrap().unwrap();
        assert_eq!(lobby.votes.get("host").map(String::as_str), Some("host"));
        assert_eq!(lobby.version, 1);
    }

    #[tokio::test]
    async fn commit_is_conditional_on_version() {
        let store = MemorySessionStore::new();
        store
            .create_lobby(lobby("ABC123"), player("host", "Host"))
            .await
            .unwrap();
        let snapshot = store.load_snapshot("ABC123".into()).await.unwrap().unwrap();

        let mut first = snapshot.clone();
        first.players[0].lives = 2;
        let version = store.commit(snapshot.lobby.version, first).await.unwrap();
        assert_eq!(version, 1);

        let mut second = snapshot.clone();
        second.players[0].lives = 2;
        let err = store
            .commit(snapshot.lobby.version, second)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let host = store
            .find_player("ABC123".into(), "host".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(host.lives, 2);
    }

    #[tokio::test]
    async fn settings_bump_the_version() {
        let store = MemorySessionStore::new();
        store
            .create_lobby(lobby("ABC123"), player("host", "Host"))
            .await
            .unwrap();
        let outcome = store
            .update_settings("ABC123".into(), 60)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        let lobby = store.find_lobby("ABC123".into()).await.unwrap().unwrap();
        assert_eq!((lobby.round_seconds, lobby.version), (60, 1));
    }
}
