use std::time::{Duration, SystemTime};

use crate::state::{
    lobby::{Lobby, LobbySnapshot},
    state_machine::{InvalidTransition, LobbyEvent, LobbyPhase, LobbyStateMachine},
};

/// Shortest round a host can configure.
pub const MIN_ROUND_SECONDS: u32 = 30;
/// Longest round a host can configure.
pub const MAX_ROUND_SECONDS: u32 = 900;
/// Round length of a freshly created lobby.
pub const DEFAULT_ROUND_SECONDS: u32 = 180;

/// Bring any requested round length into `[MIN_ROUND_SECONDS, MAX_ROUND_SECONDS]`.
pub fn clamp_round_seconds(value: i64) -> u32 {
    // Bounds fit in u32 so the cast cannot truncate.
    value.clamp(i64::from(MIN_ROUND_SECONDS), i64::from(MAX_ROUND_SECONDS)) as u32
}

pub fn round_deadline(now: SystemTime, round_seconds: u32) -> SystemTime {
    now + Duration::from_secs(u64::from(round_seconds))
}

/// Time left before `deadline`, zero once it passed.
pub fn remaining(deadline: SystemTime, now: SystemTime) -> Duration {
    deadline.duration_since(now).unwrap_or(Duration::ZERO)
}

/// Whole seconds left, rounded up so a countdown only shows 0 once expired.
pub fn remaining_seconds(deadline: SystemTime, now: SystemTime) -> u64 {
    let left = remaining(deadline, now);
    left.as_secs() + u64::from(left.subsec_nanos() > 0)
}

pub fn is_expired(deadline: SystemTime, now: SystemTime) -> bool {
    now >= deadline
}

/// Open the next round: bump the round number, forget the previous votes and
/// arm a fresh deadline from the current round length.
pub fn begin_round(lobby: &mut Lobby, now: SystemTime) {
    lobby.phase = LobbyPhase::Playing;
    lobby.round += 1;
    lobby.votes.clear();
    lobby.round_deadline = Some(round_deadline(now, lobby.round_seconds));
}

/// Leave the lobby and play round 1.
pub fn start_game(
    snapshot: &LobbySnapshot,
    now: SystemTime,
) -> Result<LobbySnapshot, InvalidTransition> {
    LobbyStateMachine::from_phase(snapshot.lobby.phase).compute_transition(LobbyEvent::Start)?;

    let mut next = snapshot.clone();
    next.lobby.round = 0;
    begin_round(&mut next.lobby, now);
    Ok(next)
}

/// Close voting time for `round` once its deadline elapsed.
///
/// Returns `None` when there is nothing to do: the lobby already moved past
/// that round, is not playing, or the deadline has not been reached. Running it
/// twice for the same round therefore changes the lobby at most once.
pub fn expire_round(snapshot: &LobbySnapshot, round: u32, now: SystemTime) -> Option<LobbySnapshot> {
    let lobby = &snapshot.lobby;
    if lobby.round != round || !lobby.round_deadline.is_some_and(|d| is_expired(d, now)) {
        return None;
    }

    let phase = LobbyStateMachine::from_phase(lobby.phase)
        .compute_transition(LobbyEvent::DeadlineElapsed)
        .ok()?;

    let mut next = snapshot.clone();
    next.lobby.phase = phase;
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::fixtures::*;

    #[test]
    fn clamps_round_seconds() {
        assert_eq!(clamp_round_seconds(-5), 30);
        assert_eq!(clamp_round_seconds(29), 30);
        assert_eq!(clamp_round_seconds(30), 30);
        assert_eq!(clamp_round_seconds(240), 240);
        assert_eq!(clamp_round_seconds(900), 900);
        assert_eq!(clamp_round_seconds(5_000), 900);
        assert_eq!(clamp_round_seconds(i64::MAX), 900);
    }

    #[test]
    fn remaining_rounds_up_and_saturates() {
        let deadline = epoch(10);
        assert_eq!(remaining_seconds(deadline, epoch(0)), 10);
        assert_eq!(
            remaining_seconds(deadline, epoch(0) + Duration::from_millis(9_500)),
            1
        );
        assert_eq!(remaining_seconds(deadline, epoch(10)), 0);
        assert_eq!(remaining(deadline, epoch(20)), Duration::ZERO);
        assert!(is_expired(deadline, epoch(10)));
        assert!(!is_expired(deadline, epoch(9)));
    }

    #[test]
    fn solo_start_opens_round_one() {
        let lobby = snapshot(LobbyPhase::Lobby, &["host"]);
        let started = start_game(&lobby, epoch(100)).unwrap();
        assert_eq!(started.lobby.phase, LobbyPhase::Playing);
        assert_eq!(started.lobby.round, 1);
        assert_eq!(started.lobby.round_deadline, Some(epoch(280)));
        assert!(started.lobby.votes.is_empty());
    }

    #[test]
    fn start_is_rejected_once_playing() {
        let lobby = snapshot(LobbyPhase::Playing, &["host"]);
        assert!(start_game(&lobby, epoch(0)).is_err());
    }

    #[test]
    fn expiry_moves_to_voting_once() {
        let mut lobby = snapshot(LobbyPhase::Playing, &["a", "b", "c"]);
        lobby.lobby.round_deadline = Some(epoch(60));

        assert!(expire_round(&lobby, 1, epoch(59)).is_none());
        assert!(expire_round(&lobby, 2, epoch(61)).is_none());

        let expired = expire_round(&lobby, 1, epoch(61)).unwrap();
        assert_eq!(expired.lobby.phase, LobbyPhase::Voting);
        assert_eq!(expired.lobby.round_deadline, Some(epoch(60)));
        assert!(expire_round(&expired, 1, epoch(62)).is_none());
    }

    #[test]
    fn expiry_ignores_lobbies_without_deadline() {
        let lobby = snapshot(LobbyPhase::Playing, &["a"]);
        assert!(expire_round(&lobby, 1, epoch(1_000)).is_none());
    }
}
