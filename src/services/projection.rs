use std::time::SystemTime;

use crate::{
    dto::{
        format_system_time,
        lobby::{LobbyView, PlayerView},
    },
    state::{
        finale::finalists,
        lobby::LobbySnapshot,
        scheduler,
        state_machine::{LobbyPhase, LobbyStateMachine, RevealStage},
        tally::tally,
    },
};

/// Project a lobby snapshot into the view of `viewer` (anonymous when `None`).
pub fn project(snapshot: &LobbySnapshot, viewer: Option<&str>, now: SystemTime) -> LobbyView {
    let lobby = &snapshot.lobby;
    let phase = lobby.phase;
    let round_running = matches!(phase, LobbyPhase::Playing | LobbyPhase::Voting);

    let players = snapshot
        .players
        .iter()
        .map(|player| PlayerView {
            id: player.id.clone(),
            name: player.name.clone(),
            lives: player.lives,
            alive: player.alive,
            is_host: lobby.is_host(&player.id),
            has_voted: player.alive && lobby.votes.contains_key(&player.id),
            is_viewer: viewer == Some(player.id.as_str()),
        })
        .collect();

    let tie_break_candidates = match phase {
        LobbyPhase::Reveal(RevealStage::Round) => {
            tally(&lobby.votes, &snapshot.alive_ids()).leaders
        }
        LobbyPhase::Reveal(RevealStage::Finale) => finalists(snapshot),
        _ => Vec::new(),
    };
    let finalist_ids = match phase {
        LobbyPhase::Finale | LobbyPhase::Reveal(RevealStage::Finale) => finalists(snapshot),
        _ => Vec::new(),
    };

    let deadline = lobby.round_deadline.filter(|_| round_running);

    LobbyView {
        code: lobby.code.to_string(),
        phase: phase.into(),
        round: lobby.round,
        round_seconds: lobby.round_seconds,
        round_deadline: deadline.map(format_system_time),
        remaining_seconds: deadline.map(|deadline| scheduler::remaining_seconds(deadline, now)),
        host_id: lobby.host_id.clone(),
        viewer_id: viewer.map(str::to_string),
        is_host: viewer.is_some_and(|id| lobby.is_host(id)),
        players,
        votes_received: snapshot.votes_received(),
        living: snapshot.alive_count(),
        can_vote: LobbyStateMachine::from_phase(phase).accepts_votes()
            && viewer.is_some_and(|id| snapshot.is_alive(id)),
        tie_break_candidates,
        finalists: finalist_ids,
        winner_id: lobby.winner_id.clone(),
    }
}
