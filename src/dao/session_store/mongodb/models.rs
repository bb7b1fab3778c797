use indexmap::IndexMap;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    LobbyEntity, LobbyPhaseEntity, LobbySessionEntity, PlayerEntity, RevealStageEntity,
};

/// One document per lobby, players embedded and keyed by identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLobbyDocument {
    #[serde(rename = "_id")]
    pub code: String,
    host_id: String,
    phase: LobbyPhaseEntity,
    #[serde(default)]
    reveal_stage: Option<RevealStageEntity>,
    round: i64,
    #[serde(default)]
    round_deadline: Option<DateTime>,
    round_seconds: i64,
    #[serde(default)]
    votes: IndexMap<String, String>,
    #[serde(default)]
    winner_id: Option<String>,
    created_at: DateTime,
    pub version: i64,
    #[serde(default)]
    players: IndexMap<String, MongoPlayerDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    name: String,
    lives: i32,
    alive: bool,
    joined_at: DateTime,
}

impl MongoPlayerDocument {
    /// Raw document used for `$set` updates of a single player.
    pub fn to_document(&self) -> Document {
        doc! {
            "name": self.name.clone(),
            "lives": self.lives,
            "alive": self.alive,
            "joined_at": self.joined_at,
        }
    }

    fn into_entity(self, id: String) -> PlayerEntity {
        let lives = u8::try_from(self.lives.max(0)).unwrap_or(u8::MAX);
        PlayerEntity {
            id,
            name: self.name,
            lives,
            alive: lives > 0,
            joined_at: self.joined_at.to_system_time(),
        }
    }
}

impl From<&PlayerEntity> for MongoPlayerDocument {
    fn from(value: &PlayerEntity) -> Self {
        Self {
            name: value.name.clone(),
            lives: i32::from(value.lives),
            alive: value.alive,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl MongoLobbyDocument {
    /// Players of the lobby as entities.
    pub fn players(&self) -> Vec<PlayerEntity> {
        self.players
            .iter()
            .map(|(id, player)| player.clone().into_entity(id.clone()))
            .collect()
    }

    pub fn player(&self, id: &str) -> Option<PlayerEntity> {
        self.players
            .get(id)
            .map(|player| player.clone().into_entity(id.to_string()))
    }

    pub fn lobby(&self) -> LobbyEntity {
        LobbyEntity {
            code: self.code.clone(),
            host_id: self.host_id.clone(),
            phase: self.phase,
            reveal_stage: self.reveal_stage,
            round: u32::try_from(self.round).unwrap_or_default(),
            round_deadline: self.round_deadline.map(DateTime::to_system_time),
            round_seconds: u32::try_from(self.round_seconds).unwrap_or_default(),
            votes: self.votes.clone(),
            winner_id: self.winner_id.clone(),
            created_at: self.created_at.to_system_time(),
            version: u64::try_from(self.version).unwrap_or_default(),
        }
    }
}

impl From<MongoLobbyDocument> for LobbySessionEntity {
    fn from(value: MongoLobbyDocument) -> Self {
        Self {
            lobby: value.lobby(),
            players: value.players(),
        }
    }
}

impl From<LobbySessionEntity> for MongoLobbyDocument {
    fn from(value: LobbySessionEntity) -> Self {
        let LobbySessionEntity { lobby, players } = value;
        Self {
            code: lobby.code,
            host_id: lobby.host_id,
            phase: lobby.phase,
            reveal_stage: lobby.reveal_stage,
            round: i64::from(lobby.round),
            round_deadline: lobby.round_deadline.map(DateTime::from_system_time),
            round_seconds: i64::from(lobby.round_seconds),
            votes: lobby.votes,
            winner_id: lobby.winner_id,
            created_at: DateTime::from_system_time(lobby.created_at),
            version: i64::try_from(lobby.version).unwrap_or(i64::MAX),
            players: players
                .iter()
                .map(|player| (player.id.clone(), player.into()))
                .collect(),
        }
    }
}

/// Filter selecting a lobby by its code.
pub fn doc_code(code: &str) -> Document {
    doc! { "_id": code }
}
