use thiserror::Error;

use crate::state::{
    lobby::{LobbySnapshot, PlayerId},
    state_machine::{InvalidTransition, LobbyEvent, LobbyPhase, LobbyStateMachine},
};

/// Number of questions in the finale quiz, and so the most wrong answers a
/// finalist can give.
pub const MAX_WRONG_ANSWERS: i64 = 15;

/// What resolving the finale did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinaleOutcome {
    /// `loser_id` gave more wrong answers and lost a life; `winner_id` won the game.
    Decided {
        loser_id: PlayerId,
        winner_id: PlayerId,
        lives_left: u8,
    },
    /// Same number of wrong answers; the host has to pick the loser.
    Tie { finalists: Vec<PlayerId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinaleResolution {
    pub outcome: FinaleOutcome,
    pub snapshot: LobbySnapshot,
}

/// Reasons a finale result is refused. None of them mutate the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinaleError {
    #[error("wrong answer count {0} is outside 0..={MAX_WRONG_ANSWERS}")]
    WrongCountOutOfRange(i64),
    #[error("the finale needs exactly two alive players, found {0}")]
    NotTwoFinalists(usize),
    #[error("player `{0}` is not a finalist")]
    NotAFinalist(PlayerId),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// The two alive players in roster order, "p1" first.
pub fn finalists(snapshot: &LobbySnapshot) -> Vec<PlayerId> {
    snapshot.alive_ids().into_iter().take(2).collect()
}

fn exact_finalists(snapshot: &LobbySnapshot) -> Result<(PlayerId, PlayerId), FinaleError> {
    let mut alive = snapshot.alive_ids();
    if alive.len() != 2 {
        return Err(FinaleError::NotTwoFinalists(alive.len()));
    }
    let p2 = alive.pop().unwrap_or_default();
    let p1 = alive.pop().unwrap_or_default();
    Ok((p1, p2))
}

/// Apply the quiz result of the finale: the finalist with strictly more wrong
/// answers loses and the game ends, equal counts go to a host tie-break.
pub fn resolve_finale(
    snapshot: &LobbySnapshot,
    p1_wrong: i64,
    p2_wrong: i64,
) -> Result<FinaleResolution, FinaleError> {
    for count in [p1_wrong, p2_wrong] {
        if !(0..=MAX_WRONG_ANSWERS).contains(&count) {
            return Err(FinaleError::WrongCountOutOfRange(count));
        }
    }

    let machine = LobbyStateMachine::from_phase(snapshot.lobby.phase);
    machine.compute_transition(LobbyEvent::FinaleTied)?;
    let (p1, p2) = exact_finalists(snapshot)?;

    if p1_wrong == p2_wrong {
        let mut next = snapshot.clone();
        next.lobby.phase = machine.compute_transition(LobbyEvent::FinaleTied)?;
        return Ok(FinaleResolution {
            outcome: FinaleOutcome::Tie {
                finalists: vec![p1, p2],
            },
            snapshot: next,
        });
    }

    let (loser_id, winner_id) = if p1_wrong > p2_wrong { (p1, p2) } else { (p2, p1) };
    let phase = machine.compute_transition(LobbyEvent::FinaleDecided)?;
    Ok(conclude(snapshot, loser_id, winner_id, phase))
}

/// Settle a tied finale with the loser picked by the host.
pub fn break_tie(
    snapshot: &LobbySnapshot,
    loser_id: &str,
) -> Result<FinaleResolution, FinaleError> {
    let phase = LobbyStateMachine::from_phase(snapshot.lobby.phase)
        .compute_transition(LobbyEvent::TieBroken)?;
    let (p1, p2) = exact_finalists(snapshot)?;

    let (loser_id, winner_id) = if loser_id == p1 {
        (p1, p2)
    } else if loser_id == p2 {
        (p2, p1)
    } else {
        return Err(FinaleError::NotAFinalist(loser_id.to_string()));
    };

    Ok(conclude(snapshot, loser_id, winner_id, phase))
}

fn conclude(
    snapshot: &LobbySnapshot,
    loser_id: PlayerId,
    winner_id: PlayerId,
    phase: LobbyPhase,
) -> FinaleResolution {
    let mut next = snapshot.clone();
    let mut lives_left = 0;
    if let Some(loser) = next.player_mut(&loser_id) {
        loser.lose_life();
        lives_left = loser.lives;
    }
    next.lobby.phase = phase;
    next.lobby.winner_id = Some(winner_id.clone());
    next.lobby.round_deadline = None;

    FinaleResolution {
        outcome: FinaleOutcome::Decided {
            loser_id,
            winner_id,
            lives_left,
        },
        snapshot: next,
    }
}
