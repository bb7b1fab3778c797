use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Persisted phase label of a lobby.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LobbyPhaseEntity {
    Lobby,
    Playing,
    Voting,
    Reveal,
    Finale,
    Ended,
}

impl LobbyPhaseEntity {
    /// Label used in stored documents and query filters.
    pub fn as_str(self) -> &'static str {
        match self {
            LobbyPhaseEntity::Lobby => "lobby",
            LobbyPhaseEntity::Playing => "playing",
            LobbyPhaseEntity::Voting => "voting",
            LobbyPhaseEntity::Reveal => "reveal",
            LobbyPhaseEntity::Finale => "finale",
            LobbyPhaseEntity::Ended => "ended",
        }
    }

    /// Phases in which votes may be written.
    pub fn voting_open(self) -> bool {
        matches!(self, LobbyPhaseEntity::Playing | LobbyPhaseEntity::Voting)
    }
}

/// What a stored `reveal` phase is waiting for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevealStageEntity {
    Round,
    Finale,
}

/// Lobby record persisted by the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyEntity {
    /// Six character upper-case join code, primary key.
    pub code: String,
    /// Identity of the creator; the only caller allowed to drive the game.
    pub host_id: String,
    pub phase: LobbyPhaseEntity,
    /// Only meaningful while `phase` is `reveal`.
    pub reveal_stage: Option<RevealStageEntity>,
    pub round: u32,
    pub round_deadline: Option<SystemTime>,
    pub round_seconds: u32,
    /// Voter identity to target identity for the current round.
    pub votes: IndexMap<String, String>,
    pub winner_id: Option<String>,
    pub created_at: SystemTime,
    /// Write counter, bumped by the store on every successful write.
    pub version: u64,
}

impl LobbyEntity {
    /// New members may join until the finale starts.
    pub fn admits_new_players(&self) -> bool {
        match self.phase {
            LobbyPhaseEntity::Finale | LobbyPhaseEntity::Ended => false,
            LobbyPhaseEntity::Reveal => self.reveal_stage != Some(RevealStageEntity::Finale),
            _ => true,
        }
    }
}

/// Player record persisted under a lobby.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    pub id: String,
    pub name: String,
    pub lives: u8,
    pub alive: bool,
    pub joined_at: SystemTime,
}

/// A lobby together with all of its players, read or written as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySessionEntity {
    pub lobby: LobbyEntity,
    pub players: Vec<PlayerEntity>,
}

/// Result of a plain (non-transactional) write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied.
    Applied,
    /// The lobby does not exist.
    Missing,
    /// The lobby exists but the write guard did not hold (e.g. the round moved on
    /// or the finale closed the roster).
    Rejected,
}
