use std::time::SystemTime;

use thiserror::Error;

use crate::state::{
    lobby::{LobbySnapshot, PlayerId},
    scheduler,
    state_machine::{InvalidTransition, LobbyEvent, LobbyPhase, LobbyStateMachine, RoundNext},
    tally::tally,
};

/// What resolving a round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// `loser_id` lost a life.
    Eliminated {
        loser_id: PlayerId,
        lives_left: u8,
        next_phase: LobbyPhase,
    },
    /// No single loser; the host has to pick one of `leaders`.
    Tie { leaders: Vec<PlayerId> },
}

/// Outcome plus the lobby state to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    pub outcome: RoundOutcome,
    pub snapshot: LobbySnapshot,
}

/// Reasons a round cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The requested loser is not in the lobby.
    #[error("player `{0}` is not a member of this lobby")]
    UnknownPlayer(PlayerId),
    /// The requested loser has no life left to lose.
    #[error("player `{0}` is already eliminated")]
    NotAlive(PlayerId),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Resolve the current round from `snapshot`.
///
/// Without `explicit_loser` the round is decided by the vote tally. A tie
/// leaves lives untouched and parks the lobby in reveal until the host picks a
/// loser. Otherwise the loser loses one life and the group moves on to the next
/// round, the finale (two alive) or the end of the game (one or none alive).
pub fn resolve_round(
    snapshot: &LobbySnapshot,
    explicit_loser: Option<&str>,
    now: SystemTime,
) -> Result<RoundResolution, ResolveError> {
    let machine = LobbyStateMachine::from_phase(snapshot.lobby.phase);
    // Tied and resolved rounds leave from the same phases.
    machine.compute_transition(LobbyEvent::RoundTied)?;

    let loser_id = match explicit_loser {
        Some(id) => {
            let player = snapshot
                .player(id)
                .ok_or_else(|| ResolveError::UnknownPlayer(id.to_string()))?;
            if !player.alive {
                return Err(ResolveError::NotAlive(id.to_string()));
            }
            id.to_string()
        }
        None => {
            let result = tally(&snapshot.lobby.votes, &snapshot.alive_ids());
            match result.clear_loser() {
                Some(loser) => loser.clone(),
                None => {
                    let mut next = snapshot.clone();
                    next.lobby.phase = machine.compute_transition(LobbyEvent::RoundTied)?;
                    return Ok(RoundResolution {
                        outcome: RoundOutcome::Tie {
                            leaders: result.leaders,
                        },
                        snapshot: next,
                    });
                }
            }
        }
    };

    let mut next = snapshot.clone();
    let lives_left = match next.player_mut(&loser_id) {
        Some(player) => {
            player.lose_life();
            player.lives
        }
        None => return Err(ResolveError::UnknownPlayer(loser_id)),
    };

    let alive = next.alive_ids();
    let round_next = match alive.len() {
        0 | 1 => RoundNext::GameOver,
        2 => RoundNext::Finale,
        _ => RoundNext::NextRound,
    };
    let next_phase = machine.compute_transition(LobbyEvent::RoundResolved(round_next))?;

    match round_next {
        RoundNext::NextRound => scheduler::begin_round(&mut next.lobby, now),
        RoundNext::Finale => {
            next.lobby.phase = next_phase;
            next.lobby.votes.clear();
            next.lobby.round_deadline = None;
        }
        RoundNext::GameOver => {
            next.lobby.phase = next_phase;
            next.lobby.votes.clear();
            next.lobby.round_deadline = None;
            next.lobby.winner_id = alive.into_iter().next();
        }
    }

    Ok(RoundResolution {
        outcome: RoundOutcome::Eliminated {
            loser_id,
            lives_left,
            next_phase,
        },
        snapshot: next,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::state::{lobby::fixtures::*, state_machine::RevealStage};

    fn lives(snapshot: &LobbySnapshot) -> Vec<u8> {
        snapshot.players.iter().map(|player| player.lives).collect()
    }

    #[test]
    fn clear_loser_loses_one_life_and_play_continues() {
        let mut lobby = snapshot(LobbyPhase::Reveal(RevealStage::Round), &["A", "B", "C"]);
        vote(&mut lobby, "A", "C");
        vote(&mut lobby, "B", "C");
        vote(&mut lobby, "C", "A");

        let resolution = resolve_round(&lobby, None, epoch(500)).unwrap();
        assert_eq!(
            resolution.outcome,
            RoundOutcome::Eliminated {
                loser_id: "C".into(),
                lives_left: 2,
                next_phase: LobbyPhase::Playing,
            }
        );
        let next = resolution.snapshot;
        assert_eq!(lives(&next), vec![3, 3, 2]);
        assert!(next.is_alive("C"));
        assert_eq!(next.lobby.phase, LobbyPhase::Playing);
        assert_eq!(next.lobby.round, 2);
        assert!(next.lobby.votes.is_empty());
        assert_eq!(next.lobby.round_deadline, Some(epoch(680)));
    }

    #[test]
    fn tie_without_choice_changes_no_life() {
        let mut lobby = snapshot(LobbyPhase::Voting, &["A", "B", "C"]);
        vote(&mut lobby, "A", "B");
        vote(&mut lobby, "B", "A");

        let resolution = resolve_round(&lobby, None, epoch(0)).unwrap();
        assert_eq!(
            resolution.outcome,
            RoundOutcome::Tie {
                leaders: vec!["A".into(), "B".into()],
            }
        );
        assert_eq!(lives(&resolution.snapshot), vec![3, 3, 3]);
        assert_eq!(
            resolution.snapshot.lobby.phase,
            LobbyPhase::Reveal(RevealStage::Round)
        );
        assert_eq!(resolution.snapshot.lobby.votes, lobby.lobby.votes);
    }

    #[test]
    fn explicit_loser_breaks_a_tie() {
        let mut lobby = snapshot(LobbyPhase::Reveal(RevealStage::Round), &["A", "B", "C"]);
        vote(&mut lobby, "A", "B");
        vote(&mut lobby, "B", "A");

        let resolution = resolve_round(&lobby, Some("B"), epoch(0)).unwrap();
        assert_eq!(lives(&resolution.snapshot), vec![3, 2, 3]);
    }

    #[test]
    fn explicit_loser_must_be_alive_member() {
        let mut lobby = snapshot(LobbyPhase::Voting, &["A", "B", "C"]);
        set_lives(&mut lobby, "C", 0);
        assert_eq!(
            resolve_round(&lobby, Some("Z"), epoch(0)),
            Err(ResolveError::UnknownPlayer("Z".into()))
        );
        assert_eq!(
            resolve_round(&lobby, Some("C"), epoch(0)),
            Err(ResolveError::NotAlive("C".into()))
        );
    }

    #[test]
    fn two_survivors_enter_the_finale() {
        let mut lobby = snapshot(LobbyPhase::Reveal(RevealStage::Round), &["A", "B", "C"]);
        set_lives(&mut lobby, "C", 1);

        let resolution = resolve_round(&lobby, Some("C"), epoch(0)).unwrap();
        let next = resolution.snapshot;
        assert_eq!(next.lobby.phase, LobbyPhase::Finale);
        assert_eq!(next.alive_count(), 2);
        assert_eq!(next.lobby.round, 1);
        assert_eq!(next.lobby.round_deadline, None);
        assert!(!next.is_alive("C"));
    }

    #[test]
    fn last_survivor_wins_outright() {
        let mut lobby = snapshot(LobbyPhase::Voting, &["A", "B"]);
        set_lives(&mut lobby, "A", 1);
        set_lives(&mut lobby, "B", 0);
        vote(&mut lobby, "A", "A");

        let resolution = resolve_round(&lobby, None, epoch(0)).unwrap();
        assert_eq!(resolution.snapshot.lobby.phase, LobbyPhase::Ended);
        assert_eq!(resolution.snapshot.lobby.winner_id, None);

        let mut lobby = snapshot(LobbyPhase::Voting, &["A"]);
        vote(&mut lobby, "A", "A");
        let resolution = resolve_round(&lobby, None, epoch(0)).unwrap();
        assert_eq!(resolution.snapshot.lobby.phase, LobbyPhase::Ended);
        assert_eq!(resolution.snapshot.lobby.winner_id.as_deref(), Some("A"));
    }

    #[test]
    fn cannot_resolve_while_still_playing() {
        let lobby = snapshot(LobbyPhase::Playing, &["A", "B", "C"]);
        assert!(matches!(
            resolve_round(&lobby, Some("A"), epoch(0)),
            Err(ResolveError::Transition(_))
        ));
    }

    proptest! {
        #[test]
        fn resolution_never_revives_or_over_punishes(
            start in prop::collection::vec(0u8..=3, 3..7),
            raw in prop::collection::vec((0usize..7, 0usize..7), 0..10),
        ) {
            let names = ["a", "b", "c", "d", "e", "f", "g"];
            let ids = &names[..start.len()];
            let mut lobby = snapshot(LobbyPhase::Voting, ids);
            for (id, lives) in ids.iter().zip(&start) {
                set_lives(&mut lobby, id, *lives);
            }
            for (voter, target) in raw {
                vote(&mut lobby, names[voter], names[target]);
            }

            let before = lobby.alive_count();
            let resolution = resolve_round(&lobby, None, epoch(0)).unwrap();
            let next = &resolution.snapshot;

            prop_assert!(next.players.iter().all(|player| player.alive == (player.lives > 0)));
            prop_assert!(next.alive_count() <= before);

            match &resolution.outcome {
                RoundOutcome::Tie { .. } => {
                    prop_assert_eq!(lives(next), lives(&lobby));
                }
                RoundOutcome::Eliminated { loser_id, next_phase, .. } => {
                    for (old, new) in lobby.players.iter().zip(&next.players) {
                        let expected = if &old.id == loser_id { old.lives - 1 } else { old.lives };
                        prop_assert_eq!(new.lives, expected);
                    }
                    prop_assert_eq!(*next_phase == LobbyPhase::Finale, next.alive_count() == 2);
                }
            }
        }
    }
}
