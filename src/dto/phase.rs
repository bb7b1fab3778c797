use serde::Serialize;
use utoipa::ToSchema;

use crate::state::state_machine::LobbyPhase;

/// Publicly visible lobby phase exposed to clients (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleLobbyPhase {
    /// Waiting for the host to start.
    Lobby,
    /// A round is running.
    Playing,
    /// The round timer ran out; remaining votes are still collected.
    Voting,
    /// Votes are in, or the finale tied; waiting for the host.
    Reveal,
    /// Head-to-head between the last two players.
    Finale,
    /// Game over.
    Ended,
}

impl From<LobbyPhase> for VisibleLobbyPhase {
    fn from(value: LobbyPhase) -> Self {
        match value {
            LobbyPhase::Lobby => VisibleLobbyPhase::Lobby,
            LobbyPhase::Playing => VisibleLobbyPhase::Playing,
            LobbyPhase::Voting => VisibleLobbyPhase::Voting,
            LobbyPhase::Reveal(_) => VisibleLobbyPhase::Reveal,
            LobbyPhase::Finale => VisibleLobbyPhase::Finale,
            LobbyPhase::Ended => VisibleLobbyPhase::Ended,
        }
    }
}
