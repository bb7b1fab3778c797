use std::{fmt, time::SystemTime};

use indexmap::IndexMap;
use rand::Rng;
use thiserror::Error;

use crate::{
    dao::models::{
        LobbyEntity, LobbyPhaseEntity, LobbySessionEntity, PlayerEntity, RevealStageEntity,
    },
    state::state_machine::{LobbyPhase, RevealStage},
};

/// Identity handed out by the identity provider.
pub type PlayerId = String;

/// Lives every player starts with.
pub const STARTING_LIVES: u8 = 3;
/// Display name used when a joining player gives none.
pub const DEFAULT_PLAYER_NAME: &str = "Player";
/// Display name used when the creator gives none.
pub const DEFAULT_HOST_NAME: &str = "Host";
/// Number of characters in a lobby code.
pub const LOBBY_CODE_LENGTH: usize = 6;

const LOBBY_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short, human-typeable lobby identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LobbyCode(String);

/// Raised when a user supplied code cannot be a lobby code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid lobby code `{0}`: expected {LOBBY_CODE_LENGTH} letters or digits")]
pub struct InvalidLobbyCode(pub String);

impl LobbyCode {
    /// Draw a fresh random code.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..LOBBY_CODE_LENGTH)
            .map(|_| {
                let index = rng.random_range(0..LOBBY_CODE_ALPHABET.len());
                LOBBY_CODE_ALPHABET[index] as char
            })
            .collect();
        Self(code)
    }

    /// Normalise and validate a code typed by a user (surrounding whitespace and
    /// case are ignored).
    pub fn parse(raw: &str) -> Result<Self, InvalidLobbyCode> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == LOBBY_CODE_LENGTH && code.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(Self(code))
        } else {
            Err(InvalidLobbyCode(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runtime view of a lobby record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lobby {
    pub code: LobbyCode,
    pub host_id: PlayerId,
    pub phase: LobbyPhase,
    /// Starts at 0, incremented each time the group enters `Playing`.
    pub round: u32,
    /// Absolute end of the current round; `None` outside `Playing`/`Voting`.
    pub round_deadline: Option<SystemTime>,
    pub round_seconds: u32,
    /// Votes of the current round, voter to target.
    pub votes: IndexMap<PlayerId, PlayerId>,
    pub winner_id: Option<PlayerId>,
    pub created_at: SystemTime,
    pub version: u64,
}

impl Lobby {
    /// Build a fresh lobby in the `Lobby` phase.
    pub fn new(code: LobbyCode, host_id: PlayerId, round_seconds: u32, now: SystemTime) -> Self {
        Self {
            code,
            host_id,
            phase: LobbyPhase::Lobby,
            round: 0,
            round_deadline: None,
            round_seconds,
            votes: IndexMap::new(),
            winner_id: None,
            created_at: now,
            version: 0,
        }
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host_id == player_id
    }
}

/// Membership record of one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Remaining lives, in `0..=STARTING_LIVES`.
    pub lives: u8,
    /// Always equal to `lives > 0`.
    pub alive: bool,
    pub joined_at: SystemTime,
}

impl Player {
    /// New member with full lives.
    pub fn new(id: PlayerId, name: String, now: SystemTime) -> Self {
        Self {
            id,
            name,
            lives: STARTING_LIVES,
            alive: true,
            joined_at: now,
        }
    }

    /// Take one life, never going below zero.
    pub fn lose_life(&mut self) {
        self.lives = self.lives.saturating_sub(1);
        self.alive = self.lives > 0;
    }
}

/// Trim a requested display name, falling back to `default` when blank.
pub fn display_name(requested: Option<&str>, default: &str) -> String {
    requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// A lobby and all of its players as read at one store version.
///
/// Players are kept in roster order: join time, then identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySnapshot {
    pub lobby: Lobby,
    pub players: Vec<Player>,
}

impl LobbySnapshot {
    pub fn new(lobby: Lobby, mut players: Vec<Player>) -> Self {
        players.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        Self { lobby, players }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.player(id).is_some_and(|player| player.alive)
    }

    /// Identities of alive players, in roster order.
    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|player| player.alive)
            .map(|player| player.id.clone())
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|player| player.alive).count()
    }

    /// Number of alive players who already voted this round.
    pub fn votes_received(&self) -> usize {
        self.lobby
            .votes
            .keys()
            .filter(|voter| self.is_alive(voter))
            .count()
    }

    /// True once every alive player has a vote recorded for the current round.
    pub fn voting_complete(&self) -> bool {
        let living = self.alive_count();
        living > 0 && self.votes_received() >= living
    }
}

impl From<LobbyPhase> for (LobbyPhaseEntity, Option<RevealStageEntity>) {
    fn from(value: LobbyPhase) -> Self {
        match value {
            LobbyPhase::Lobby => (LobbyPhaseEntity::Lobby, None),
            LobbyPhase::Playing => (LobbyPhaseEntity::Playing, None),
            LobbyPhase::Voting => (LobbyPhaseEntity::Voting, None),
            LobbyPhase::Reveal(RevealStage::Round) => {
                (LobbyPhaseEntity::Reveal, Some(RevealStageEntity::Round))
            }
            LobbyPhase::Reveal(RevealStage::Finale) => {
                (LobbyPhaseEntity::Reveal, Some(RevealStageEntity::Finale))
            }
            LobbyPhase::Finale => (LobbyPhaseEntity::Finale, None),
            LobbyPhase::Ended => (LobbyPhaseEntity::Ended, None),
        }
    }
}

fn phase_from_entity(phase: LobbyPhaseEntity, stage: Option<RevealStageEntity>) -> LobbyPhase {
    match phase {
        LobbyPhaseEntity::Lobby => LobbyPhase::Lobby,
        LobbyPhaseEntity::Playing => LobbyPhase::Playing,
        LobbyPhaseEntity::Voting => LobbyPhase::Voting,
        LobbyPhaseEntity::Reveal => match stage {
            Some(RevealStageEntity::Finale) => LobbyPhase::Reveal(RevealStage::Finale),
            Some(RevealStageEntity::Round) | None => LobbyPhase::Reveal(RevealStage::Round),
        },
        LobbyPhaseEntity::Finale => LobbyPhase::Finale,
        LobbyPhaseEntity::Ended => LobbyPhase::Ended,
    }
}

impl From<LobbyEntity> for Lobby {
    fn from(value: LobbyEntity) -> Self {
        Self {
            // Stored codes were validated when the lobby was created.
            code: LobbyCode(value.code),
            host_id: value.host_id,
            phase: phase_from_entity(value.phase, value.reveal_stage),
            round: value.round,
            round_deadline: value.round_deadline,
            round_seconds: value.round_seconds,
            votes: value.votes,
            winner_id: value.winner_id,
            created_at: value.created_at,
            version: value.version,
        }
    }
}

impl From<Lobby> for LobbyEntity {
    fn from(value: Lobby) -> Self {
        let (phase, reveal_stage) = value.phase.into();
        Self {
            code: value.code.0,
            host_id: value.host_id,
            phase,
            reveal_stage,
            round: value.round,
            round_deadline: value.round_deadline,
            round_seconds: value.round_seconds,
            votes: value.votes,
            winner_id: value.winner_id,
            created_at: value.created_at,
            version: value.version,
        }
    }
}

impl From<PlayerEntity> for Player {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            lives: value.lives,
            alive: value.lives > 0,
            joined_at: value.joined_at,
        }
    }
}

impl From<Player> for PlayerEntity {
    fn from(value: Player) -> Self {
        Self {
            id: value.id,
            name: value.name,
            lives: value.lives,
            alive: value.alive,
            joined_at: value.joined_at,
        }
    }
}

impl From<LobbySessionEntity> for LobbySnapshot {
    fn from(value: LobbySessionEntity) -> Self {
        LobbySnapshot::new(
            value.lobby.into(),
            value.players.into_iter().map(Into::into).collect(),
        )
    }
}

impl From<LobbySnapshot> for LobbySessionEntity {
    fn from(value: LobbySnapshot) -> Self {
        Self {
            lobby: value.lobby.into(),
            players: value.players.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;

    /// Fixed clock used by the pure resolver tests.
    pub fn epoch(seconds: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + seconds)
    }

    /// Snapshot where `ids` joined in order and the first one hosts.
    pub fn snapshot(phase: LobbyPhase, ids: &[&str]) -> LobbySnapshot {
        let host = ids.first().copied().unwrap_or("host").to_string();
        let mut lobby = Lobby::new(LobbyCode::parse("ABC123").unwrap(), host, 180, epoch(0));
        lobby.phase = phase;
        lobby.round = 1;
        let players = ids
            .iter()
            .enumerate()
            .map(|(index, id)| Player::new(id.to_string(), id.to_uppercase(), epoch(index as u64)))
            .collect();
        LobbySnapshot::new(lobby, players)
    }

    pub fn vote(snapshot: &mut LobbySnapshot, voter: &str, target: &str) {
        snapshot
            .lobby
            .votes
            .insert(voter.to_string(), target.to_string());
    }

    pub fn set_lives(snapshot: &mut LobbySnapshot, id: &str, lives: u8) {
        let player = snapshot.player_mut(id).unwrap();
        player.lives = lives;
        player.alive = lives > 0;
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn generated_codes_are_valid() {
        for _ in 0..50 {
            let code = LobbyCode::generate();
            assert_eq!(LobbyCode::parse(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn parse_normalises_case_and_whitespace() {
        assert_eq!(LobbyCode::parse(" ab12cd ").unwrap().as_str(), "AB12CD");
        assert!(LobbyCode::parse("AB12C").is_err());
        assert!(LobbyCode::parse("AB12CDE").is_err());
        assert!(LobbyCode::parse("AB-2CD").is_err());
    }

    #[test]
    fn losing_lives_floors_at_zero() {
        let mut player = Player::new("p".into(), "P".into(), epoch(0));
        player.lose_life();
        assert_eq!((player.lives, player.alive), (2, true));
        player.lose_life();
        player.lose_life();
        assert_eq!((player.lives, player.alive), (0, false));
        player.lose_life();
        assert_eq!((player.lives, player.alive), (0, false));
    }

    #[test]
    fn display_name_falls_back_on_blank() {
        assert_eq!(display_name(Some("  Ada "), DEFAULT_PLAYER_NAME), "Ada");
        assert_eq!(display_name(Some("   "), DEFAULT_PLAYER_NAME), "Player");
        assert_eq!(display_name(None, DEFAULT_HOST_NAME), "Host");
    }

    #[test]
    fn snapshot_keeps_roster_order() {
        let lobby = Lobby::new(LobbyCode::parse("ABC123").unwrap(), "b".into(), 180, epoch(0));
        let players = vec![
            Player::new("c".into(), "C".into(), epoch(5)),
            Player::new("b".into(), "B".into(), epoch(1)),
            Player::new("a".into(), "A".into(), epoch(1)),
        ];
        let snapshot = LobbySnapshot::new(lobby, players);
        assert_eq!(snapshot.alive_ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn voting_completion_counts_only_alive_voters() {
        let mut snapshot = snapshot(LobbyPhase::Playing, &["a", "b", "c"]);
        set_lives(&mut snapshot, "c", 0);
        vote(&mut snapshot, "c", "a");
        vote(&mut snapshot, "a", "b");
        assert!(!snapshot.voting_complete());
        vote(&mut snapshot, "b", "a");
        assert!(snapshot.voting_complete());
        assert_eq!(snapshot.votes_received(), 2);
    }

    #[test]
    fn entity_round_trip_keeps_reveal_stage() {
        let mut snapshot = snapshot(LobbyPhase::Reveal(RevealStage::Finale), &["a", "b"]);
        vote(&mut snapshot, "a", "b");
        let entity: LobbySessionEntity = snapshot.clone().into();
        assert_eq!(entity.lobby.phase, LobbyPhaseEntity::Reveal);
        assert_eq!(entity.lobby.reveal_stage, Some(RevealStageEntity::Finale));
        assert_eq!(LobbySnapshot::from(entity), snapshot);
    }
}
