//! Request and response bodies of the lobby REST API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{phase::VisibleLobbyPhase, validation::validate_player_id},
    state::{elimination::RoundOutcome, finale::FinaleOutcome},
};

/// Payload used to open a new lobby; the caller becomes its host.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct CreateLobbyRequest {
    /// Host display name, "Host" when absent or blank.
    #[serde(default)]
    #[validate(length(max = 40))]
    pub name: Option<String>,
}

/// Payload used to join (or re-join) a lobby.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct JoinLobbyRequest {
    /// Display name, "Player" when absent or blank.
    #[serde(default)]
    #[validate(length(max = 40))]
    pub name: Option<String>,
}

/// New round length; values outside [30, 900] are clamped.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub round_seconds: i64,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CastVoteRequest {
    /// Player the caller wants to take a life from.
    #[validate(custom(function = "validate_player_id"))]
    pub target_id: String,
}

/// Resolve the current round, or break a tied finale.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct RevealRequest {
    /// Loser picked by the host; the vote tally decides when absent.
    #[serde(default)]
    #[validate(custom(function = "validate_player_id"))]
    pub loser_id: Option<String>,
}

/// Wrong answer counts of the two finalists, in roster order.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct FinaleRequest {
    #[validate(range(min = 0, max = 15))]
    pub p1_wrong: i64,
    #[validate(range(min = 0, max = 15))]
    pub p2_wrong: i64,
}

/// One participant as seen by the viewer.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub lives: u8,
    pub alive: bool,
    pub is_host: bool,
    /// Whether the player already voted this round.
    pub has_voted: bool,
    pub is_viewer: bool,
}

/// Full lobby state projected for one viewer. Every push carries a complete
/// view; clients replace their state instead of merging.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct LobbyView {
    pub code: String,
    pub phase: VisibleLobbyPhase,
    pub round: u32,
    pub round_seconds: u32,
    /// RFC 3339 timestamp of the round end.
    pub round_deadline: Option<String>,
    /// Seconds left in the round, rounded up.
    pub remaining_seconds: Option<u64>,
    pub host_id: String,
    pub viewer_id: Option<String>,
    pub is_host: bool,
    /// Players in roster order.
    pub players: Vec<PlayerView>,
    /// Alive players who voted this round.
    pub votes_received: usize,
    /// Alive players.
    pub living: usize,
    /// Whether the viewer may vote right now.
    pub can_vote: bool,
    /// Players the host may pick from while revealing.
    pub tie_break_candidates: Vec<String>,
    /// The two finalists, during the finale and its tie-break.
    pub finalists: Vec<String>,
    pub winner_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateLobbyResponse {
    pub code: String,
    pub lobby: LobbyView,
}

/// What a reveal did.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RevealOutcomeDto {
    /// A round loser lost a life.
    Eliminated {
        loser_id: String,
        lives_left: u8,
        next_phase: VisibleLobbyPhase,
    },
    /// No single loser; pick one of `leaders`.
    Tie { leaders: Vec<String> },
    /// A tied finale was settled by the host.
    FinaleDecided {
        loser_id: String,
        winner_id: String,
        lives_left: u8,
    },
}

impl From<RoundOutcome> for RevealOutcomeDto {
    fn from(value: RoundOutcome) -> Self {
        match value {
            RoundOutcome::Eliminated {
                loser_id,
                lives_left,
                next_phase,
            } => RevealOutcomeDto::Eliminated {
                loser_id,
                lives_left,
                next_phase: next_phase.into(),
            },
            RoundOutcome::Tie { leaders } => RevealOutcomeDto::Tie { leaders },
        }
    }
}

impl From<FinaleOutcome> for RevealOutcomeDto {
    fn from(value: FinaleOutcome) -> Self {
        match value {
            FinaleOutcome::Decided {
                loser_id,
                winner_id,
                lives_left,
            } => RevealOutcomeDto::FinaleDecided {
                loser_id,
                winner_id,
                lives_left,
            },
            FinaleOutcome::Tie { finalists } => RevealOutcomeDto::Tie { leaders: finalists },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevealResponse {
    pub outcome: RevealOutcomeDto,
    pub lobby: LobbyView,
}

/// What submitting the finale result did.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FinaleOutcomeDto {
    Decided {
        loser_id: String,
        winner_id: String,
        lives_left: u8,
    },
    /// Same count; the host picks the loser through a reveal.
    Tie { finalists: Vec<String> },
}

impl From<FinaleOutcome> for FinaleOutcomeDto {
    fn from(value: FinaleOutcome) -> Self {
        match value {
            FinaleOutcome::Decided {
                loser_id,
                winner_id,
                lives_left,
            } => FinaleOutcomeDto::Decided {
                loser_id,
                winner_id,
                lives_left,
            },
            FinaleOutcome::Tie { finalists } => FinaleOutcomeDto::Tie { finalists },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FinaleResponse {
    pub outcome: FinaleOutcomeDto,
    pub lobby: LobbyView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finale_counts_are_range_checked() {
        let ok = FinaleRequest {
            p1_wrong: 0,
            p2_wrong: 15,
        };
        assert!(ok.validate().is_ok());
        let bad = FinaleRequest {
            p1_wrong: 16,
            p2_wrong: -1,
        };
        let errors = bad.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("p1_wrong"));
        assert!(errors.field_errors().contains_key("p2_wrong"));
    }

    #[test]
    fn names_and_identities_are_checked() {
        let long = JoinLobbyRequest {
            name: Some("x".repeat(41)),
        };
        assert!(long.validate().is_err());
        assert!(JoinLobbyRequest::default().validate().is_ok());

        let vote = CastVoteRequest {
            target_id: "a.b".into(),
        };
        assert!(vote.validate().is_err());
        assert!(RevealRequest::default().validate().is_ok());
    }

    #[test]
    fn reveal_body_is_optional_fields_only() {
        let request: RevealRequest = serde_json::from_str("{}").unwrap();
        assert!(request.loser_id.is_none());
    }

    #[test]
    fn outcomes_serialise_with_a_result_tag() {
        let json = serde_json::to_value(RevealOutcomeDto::Tie {
            leaders: vec!["a".into(), "b".into()],
        })
        .unwrap();
        assert_eq!(json["result"], "tie");
        assert_eq!(json["leaders"][1], "b");
    }
}
