pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::{
    models::{LobbyEntity, LobbySessionEntity, PlayerEntity, WriteOutcome},
    storage::StorageResult,
};

/// Abstraction over the persistence layer for lobbies and their players.
///
/// A lobby and its players form one document group. Reads of the whole group
/// go through [`SessionStore::load_snapshot`]; read-then-write changes go
/// through [`SessionStore::commit`], which only applies when nobody wrote the
/// group since the snapshot was read.
pub trait SessionStore: Send + Sync {
    fn find_lobby(&self, code: String) -> BoxFuture<'static, StorageResult<Option<LobbyEntity>>>;
    fn find_player(
        &self,
        code: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn list_players(&self, code: String) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Lobby plus all of its players, read at a single version.
    fn load_snapshot(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<LobbySessionEntity>>>;
    /// Insert a new lobby with its host. Fails with `Conflict` when the code is taken.
    fn create_lobby(
        &self,
        lobby: LobbyEntity,
        host: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Insert a new player, or only refresh the name of an existing one.
    fn merge_player(
        &self,
        code: String,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    /// Record `voter -> target`, only while `round` is current and open for votes.
    fn record_vote(
        &self,
        code: String,
        round: u32,
        voter_id: String,
        target_id: String,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    fn update_settings(
        &self,
        code: String,
        round_seconds: u32,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    /// Replace the lobby and its players if the stored version still equals
    /// `expected_version`, returning the new version. Fails with `Conflict` otherwise.
    fn commit(
        &self,
        expected_version: u64,
        session: LobbySessionEntity,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
