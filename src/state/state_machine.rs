use thiserror::Error;

/// High-level phases a lobby can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyPhase {
    /// Players are gathering; the host has not started the game yet.
    Lobby,
    /// A round is running and its countdown has not elapsed.
    Playing,
    /// The round deadline elapsed; votes are still collected.
    Voting,
    /// Votes are in and the round (or a tied finale) awaits resolution by the host.
    Reveal(RevealStage),
    /// Two players remain and play the head-to-head finale.
    Finale,
    /// The game is over.
    Ended,
}

/// What a reveal is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStage {
    /// A voting round waiting to be resolved (possibly through a tie-break).
    Round,
    /// A tied finale waiting for the host to pick the loser.
    Finale,
}

/// Where the group goes after a round took a life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundNext {
    /// More than two players remain alive; play another round.
    NextRound,
    /// Exactly two players remain alive.
    Finale,
    /// At most one player remains alive.
    GameOver,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyEvent {
    /// Host starts the game from the lobby.
    Start,
    /// The round deadline passed.
    DeadlineElapsed,
    /// Every alive player voted in the current round.
    AllVotesIn,
    /// Resolution found no single loser and no tie-break was supplied.
    RoundTied,
    /// A loser lost a life; carries where the group goes next.
    RoundResolved(RoundNext),
    /// Both finalists gave the same number of wrong answers.
    FinaleTied,
    /// One finalist gave strictly more wrong answers.
    FinaleDecided,
    /// Host picked the loser of a tied finale.
    TieBroken,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the lobby was in when the invalid event was received.
    pub from: LobbyPhase,
    /// The event that cannot be applied from this phase.
    pub event: LobbyEvent,
}

/// Transition table for a single lobby.
///
/// The machine holds no lock and no pending state: callers load a snapshot,
/// compute the next phase here and commit it conditionally on the snapshot
/// version, so two commands racing on the same snapshot cannot both apply.
#[derive(Debug, Clone)]
pub struct LobbyStateMachine {
    phase: LobbyPhase,
}

impl LobbyStateMachine {
    /// Resume the machine from a persisted phase.
    pub fn from_phase(phase: LobbyPhase) -> Self {
        Self { phase }
    }

    /// Whether votes are accepted in the current phase.
    pub fn accepts_votes(&self) -> bool {
        matches!(self.phase, LobbyPhase::Playing | LobbyPhase::Voting)
    }

    /// Compute a transition from an event if the transition is valid.
    pub fn compute_transition(&self, event: LobbyEvent) -> Result<LobbyPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (LobbyPhase::Lobby, LobbyEvent::Start) => LobbyPhase::Playing,
            (LobbyPhase::Playing, LobbyEvent::DeadlineElapsed) => LobbyPhase::Voting,
            (LobbyPhase::Playing | LobbyPhase::Voting, LobbyEvent::AllVotesIn) => {
                LobbyPhase::Reveal(RevealStage::Round)
            }
            (
                LobbyPhase::Voting | LobbyPhase::Reveal(RevealStage::Round),
                LobbyEvent::RoundTied,
            ) => LobbyPhase::Reveal(RevealStage::Round),
            (
                LobbyPhase::Voting | LobbyPhase::Reveal(RevealStage::Round),
                LobbyEvent::RoundResolved(next),
            ) => match next {
                RoundNext::NextRound => LobbyPhase::Playing,
                RoundNext::Finale => LobbyPhase::Finale,
                RoundNext::GameOver => LobbyPhase::Ended,
            },
            (LobbyPhase::Finale, LobbyEvent::FinaleTied) => LobbyPhase::Reveal(RevealStage::Finale),
            (LobbyPhase::Finale, LobbyEvent::FinaleDecided) => LobbyPhase::Ended,
            (LobbyPhase::Reveal(RevealStage::Finale), LobbyEvent::TieBroken) => LobbyPhase::Ended,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
