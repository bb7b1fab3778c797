//! Lobby command surface: every operation a player or the host can run against
//! a lobby, plus the system-driven round expiry.
//!
//! Commands never hold lobby state in memory. They read a snapshot from the
//! session store, decide with the pure resolvers in [`crate::state`], and
//! commit conditionally on the snapshot version. A lost race surfaces as
//! [`ServiceError::Conflict`] and is left to the caller to resubmit.

use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info, warn};

use crate::{
    dao::{models::WriteOutcome, session_store::SessionStore, storage::StorageError},
    dto::lobby::{LobbyView, RevealOutcomeDto},
    error::ServiceError,
    services::{projection::project, round_timer},
    state::{
        SharedState,
        elimination::{self, RoundOutcome},
        finale::{self, FinaleOutcome},
        lobby::{
            DEFAULT_HOST_NAME, DEFAULT_PLAYER_NAME, Lobby, LobbyCode, LobbySnapshot, Player,
            display_name,
        },
        scheduler,
        state_machine::{LobbyEvent, LobbyPhase, LobbyStateMachine, RevealStage},
    },
};

/// Re-derivations attempted by system-driven transitions racing other writers.
const SYSTEM_COMMIT_ATTEMPTS: u32 = 3;

/// What a reveal command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// A voting round was resolved (or found tied).
    Round(RoundOutcome),
    /// A tied finale was settled, or is still waiting for a loser.
    Finale(FinaleOutcome),
}

impl From<RevealOutcome> for RevealOutcomeDto {
    fn from(value: RevealOutcome) -> Self {
        match value {
            RevealOutcome::Round(outcome) => outcome.into(),
            RevealOutcome::Finale(outcome) => outcome.into(),
        }
    }
}

/// Open a new lobby hosted by `caller`, returning its code and the host's view.
pub async fn create_lobby(
    state: &SharedState,
    caller: &str,
    name: Option<&str>,
) -> Result<(LobbyCode, LobbyView), ServiceError> {
    let store = state.require_session_store().await?;
    let now = SystemTime::now();
    let host = Player::new(
        caller.to_string(),
        display_name(name, DEFAULT_HOST_NAME),
        now,
    );
    let round_seconds = state.config().default_round_seconds();
    let attempts = state.config().code_attempts();

    for attempt in 1..=attempts {
        let code = LobbyCode::generate();
        let lobby = Lobby::new(code.clone(), caller.to_string(), round_seconds, now);

        match store
            .create_lobby(lobby.clone().into(), host.clone().into())
            .await
        {
            Ok(()) => {
                info!(code = %code, host_id = caller, "lobby created");
                let snapshot = LobbySnapshot::new(lobby, vec![host]);
                let view = project(&snapshot, Some(caller), now);
                state.hub().publish(snapshot);
                return Ok((code, view));
            }
            Err(StorageError::Conflict { .. }) => {
                debug!(code = %code, attempt, "lobby code already taken; drawing another");
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(attempts, "could not allocate a free lobby code");
    Err(ServiceError::Conflict(
        "could not allocate a free lobby code, try again".into(),
    ))
}

/// Join `code` as `caller`, or refresh the display name of a returning member.
pub async fn join_lobby(
    state: &SharedState,
    code: &str,
    caller: &str,
    name: Option<&str>,
) -> Result<LobbyView, ServiceError> {
    let code = LobbyCode::parse(code)?;
    let store = state.require_session_store().await?;
    let player = Player::new(
        caller.to_string(),
        display_name(name, DEFAULT_PLAYER_NAME),
        SystemTime::now(),
    );

    match store
        .merge_player(code.to_string(), player.into())
        .await?
    {
        WriteOutcome::Applied => {}
        WriteOutcome::Missing => return Err(lobby_not_found(&code)),
        WriteOutcome::Rejected => {
            return Err(ServiceError::InvalidState(format!(
                "lobby `{code}` is past the point where new players can join"
            )));
        }
    }

    info!(code = %code, player_id = caller, "player joined lobby");
    let snapshot = publish_latest(state, &store, &code).await?;
    Ok(project(&snapshot, Some(caller), SystemTime::now()))
}

/// Host-only: leave the lobby phase and play round 1.
pub async fn start_game(
    state: &SharedState,
    code: &str,
    caller: &str,
) -> Result<LobbyView, ServiceError> {
    let code = LobbyCode::parse(code)?;
    let store = state.require_session_store().await?;
    let snapshot = load_snapshot(&store, &code).await?;
    ensure_host(&snapshot.lobby, caller, "start the game")?;

    let now = SystemTime::now();
    let next = scheduler::start_game(&snapshot, now)?;
    let committed = commit(&store, snapshot.lobby.version, next).await?;

    if let Some(deadline) = committed.lobby.round_deadline {
        round_timer::arm(state, &code, committed.lobby.round, deadline);
    }
    info!(
        code = %code,
        round = committed.lobby.round,
        players = committed.players.len(),
        "game started"
    );
    Ok(publish_view(state, committed, caller, now))
}

/// Host-only: change the round length used from the next round on. Values are
/// clamped into the allowed range, never rejected.
pub async fn update_settings(
    state: &SharedState,
    code: &str,
    caller: &str,
    round_seconds: i64,
) -> Result<LobbyView, ServiceError> {
    let code = LobbyCode::parse(code)?;
    let store = state.require_session_store().await?;
    let Some(lobby) = store.find_lobby(code.to_string()).await? else {
        return Err(lobby_not_found(&code));
    };
    let lobby: Lobby = lobby.into();
    ensure_host(&lobby, caller, "change the settings")?;

    let clamped = scheduler::clamp_round_seconds(round_seconds);
    match store.update_settings(code.to_string(), clamped).await? {
        WriteOutcome::Applied => {}
        WriteOutcome::Missing => return Err(lobby_not_found(&code)),
        WriteOutcome::Rejected => {
            return Err(ServiceError::Conflict(format!(
                "lobby `{code}` changed while updating settings"
            )));
        }
    }

    info!(code = %code, round_seconds = clamped, "round length updated");
    let snapshot = publish_latest(state, &store, &code).await?;
    Ok(project(&snapshot, Some(caller), SystemTime::now()))
}

/// Record the caller's vote for the current round, then close voting when
/// every alive player has voted.
pub async fn cast_vote(
    state: &SharedState,
    code: &str,
    caller: &str,
    target_id: &str,
) -> Result<LobbyView, ServiceError> {
    let code = LobbyCode::parse(code)?;
    let store = state.require_session_store().await?;
    let snapshot = load_snapshot(&store, &code).await?;
    let lobby = &snapshot.lobby;

    if !LobbyStateMachine::from_phase(lobby.phase).accepts_votes() {
        return Err(ServiceError::InvalidState(format!(
            "votes are closed while the lobby is in {:?}",
            lobby.phase
        )));
    }
    match snapshot.player(caller) {
        None => {
            return Err(ServiceError::NotFound(format!(
                "player `{caller}` is not in lobby `{code}`"
            )));
        }
        Some(voter) if !voter.alive => {
            return Err(ServiceError::InvalidState(
                "eliminated players cannot vote".into(),
            ));
        }
        Some(_) => {}
    }
    match snapshot.player(target_id) {
        None => {
            return Err(ServiceError::NotFound(format!(
                "player `{target_id}` is not in lobby `{code}`"
            )));
        }
        Some(target) if !target.alive => {
            return Err(ServiceError::InvalidInput(format!(
                "player `{target_id}` is already eliminated"
            )));
        }
        Some(_) => {}
    }

    let round = lobby.round;
    match store
        .record_vote(
            code.to_string(),
            round,
            caller.to_string(),
            target_id.to_string(),
        )
        .await?
    {
        WriteOutcome::Applied => {}
        WriteOutcome::Missing => return Err(lobby_not_found(&code)),
        WriteOutcome::Rejected => {
            return Err(ServiceError::InvalidState(format!(
                "round {round} closed before the vote was recorded"
            )));
        }
    }
    debug!(code = %code, round, player_id = caller, "vote recorded");

    let snapshot = close_voting_if_complete(state, &store, &code, round).await?;
    Ok(publish_view(state, snapshot, caller, SystemTime::now()))
}

/// Host-only: resolve the current round, or break a tied finale.
///
/// Without `explicit_loser` the round is decided by the votes; a tie keeps the
/// lobby in reveal and returns the leaders. In a tied finale a loser is
/// required; without one nothing changes and both finalists are returned.
pub async fn trigger_reveal(
    state: &SharedState,
    code: &str,
    caller: &str,
    explicit_loser: Option<&str>,
) -> Result<(RevealOutcome, LobbyView), ServiceError> {
    let code = LobbyCode::parse(code)?;
    let store = state.require_session_store().await?;
    let snapshot = load_snapshot(&store, &code).await?;
    ensure_host(&snapshot.lobby, caller, "reveal the round")?;
    let now = SystemTime::now();

    if snapshot.lobby.phase == LobbyPhase::Reveal(RevealStage::Finale) {
        let Some(loser_id) = explicit_loser else {
            let outcome = FinaleOutcome::Tie {
                finalists: finale::finalists(&snapshot),
            };
            let view = project(&snapshot, Some(caller), now);
            return Ok((RevealOutcome::Finale(outcome), view));
        };

        let resolution = finale::break_tie(&snapshot, loser_id)?;
        let committed = commit(&store, snapshot.lobby.version, resolution.snapshot).await?;
        round_timer::cancel(state, &code);
        info!(
            code = %code,
            loser_id,
            winner_id = ?committed.lobby.winner_id,
            "finale tie broken; game over"
        );
        return Ok((
            RevealOutcome::Finale(resolution.outcome),
            publish_view(state, committed, caller, now),
        ));
    }

    let resolution = elimination::resolve_round(&snapshot, explicit_loser, now)?;
    let committed = if resolution.snapshot == snapshot {
        snapshot
    } else {
        commit(&store, snapshot.lobby.version, resolution.snapshot).await?
    };

    match &resolution.outcome {
        RoundOutcome::Eliminated {
            loser_id,
            lives_left,
            next_phase,
        } => {
            info!(
                code = %code,
                round = committed.lobby.round,
                loser_id = %loser_id,
                lives_left,
                next_phase = ?next_phase,
                "round resolved"
            );
            match (next_phase, committed.lobby.round_deadline) {
                (LobbyPhase::Playing, Some(deadline)) => {
                    round_timer::arm(state, &code, committed.lobby.round, deadline)
                }
                _ => round_timer::cancel(state, &code),
            }
        }
        RoundOutcome::Tie { leaders } => {
            round_timer::cancel(state, &code);
            info!(code = %code, leaders = ?leaders, "round tied; waiting for a tie-break");
        }
    }

    Ok((
        RevealOutcome::Round(resolution.outcome),
        publish_view(state, committed, caller, now),
    ))
}

/// Host-only: apply the finale quiz result (wrong answers of p1 and p2).
pub async fn submit_final_result(
    state: &SharedState,
    code: &str,
    caller: &str,
    p1_wrong: i64,
    p2_wrong: i64,
) -> Result<(FinaleOutcome, LobbyView), ServiceError> {
    let code = LobbyCode::parse(code)?;
    let store = state.require_session_store().await?;
    let snapshot = load_snapshot(&store, &code).await?;
    ensure_host(&snapshot.lobby, caller, "submit the finale result")?;

    let resolution = finale::resolve_finale(&snapshot, p1_wrong, p2_wrong)?;
    let committed = commit(&store, snapshot.lobby.version, resolution.snapshot).await?;
    round_timer::cancel(state, &code);

    match &resolution.outcome {
        FinaleOutcome::Decided {
            loser_id,
            winner_id,
            ..
        } => info!(code = %code, loser_id = %loser_id, winner_id = %winner_id, "finale decided"),
        FinaleOutcome::Tie { .. } => {
            info!(code = %code, p1_wrong, p2_wrong, "finale tied; waiting for a tie-break")
        }
    }

    Ok((
        resolution.outcome,
        publish_view(state, committed, caller, SystemTime::now()),
    ))
}

/// Close voting time for `round` once its deadline elapsed. Runs with system
/// authority; returns whether the lobby changed.
pub async fn expire_round(
    state: &SharedState,
    code: &LobbyCode,
    round: u32,
) -> Result<bool, ServiceError> {
    let store = state.require_session_store().await?;

    for attempt in 1..=SYSTEM_COMMIT_ATTEMPTS {
        let Some(snapshot) = find_snapshot(&store, code).await? else {
            return Ok(false);
        };
        let Some(next) = scheduler::expire_round(&snapshot, round, SystemTime::now()) else {
            return Ok(false);
        };

        match commit(&store, snapshot.lobby.version, next).await {
            Ok(committed) => {
                info!(code = %code, round, "round time is up; voting stays open");
                state.hub().publish(committed);
                return Ok(true);
            }
            Err(ServiceError::Conflict(message)) => {
                debug!(code = %code, round, attempt, %message, "round expiry raced another write");
            }
            Err(err) => return Err(err),
        }
    }

    Err(ServiceError::Conflict(format!(
        "could not close round {round} of lobby `{code}`"
    )))
}

/// Current view of the lobby for `viewer`.
///
/// A round whose deadline passed without a running timer (for instance after a
/// restart) is closed on the way.
pub async fn lobby_view(
    state: &SharedState,
    code: &str,
    viewer: Option<&str>,
) -> Result<LobbyView, ServiceError> {
    let code = LobbyCode::parse(code)?;
    let snapshot = current_snapshot(state, &code).await?;
    Ok(project(&snapshot, viewer, SystemTime::now()))
}

/// Latest snapshot of `code`, closing an overdue round first.
pub async fn current_snapshot(
    state: &SharedState,
    code: &LobbyCode,
) -> Result<LobbySnapshot, ServiceError> {
    let store = state.require_session_store().await?;
    let snapshot = load_snapshot(&store, code).await?;

    let overdue = snapshot.lobby.phase == LobbyPhase::Playing
        && snapshot
            .lobby
            .round_deadline
            .is_some_and(|deadline| scheduler::is_expired(deadline, SystemTime::now()));
    if overdue && expire_round(state, code, snapshot.lobby.round).await? {
        return load_snapshot(&store, code).await;
    }
    Ok(snapshot)
}

/// Flip the lobby to reveal once every alive player voted in `round`.
///
/// Returns the latest snapshot either way.
async fn close_voting_if_complete(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    code: &LobbyCode,
    round: u32,
) -> Result<LobbySnapshot, ServiceError> {
    for attempt in 1..=SYSTEM_COMMIT_ATTEMPTS {
        let snapshot = load_snapshot(store, code).await?;
        let machine = LobbyStateMachine::from_phase(snapshot.lobby.phase);
        if snapshot.lobby.round != round || !machine.accepts_votes() || !snapshot.voting_complete()
        {
            return Ok(snapshot);
        }

        let mut next = snapshot.clone();
        next.lobby.phase = machine.compute_transition(LobbyEvent::AllVotesIn)?;
        next.lobby.round_deadline = None;

        match commit(store, snapshot.lobby.version, next).await {
            Ok(committed) => {
                round_timer::cancel(state, code);
                info!(code = %code, round, "all votes in; waiting for the reveal");
                return Ok(committed);
            }
            Err(ServiceError::Conflict(message)) => {
                debug!(code = %code, round, attempt, %message, "vote completion raced another write");
            }
            Err(err) => return Err(err),
        }
    }

    load_snapshot(store, code).await
}

async fn find_snapshot(
    store: &Arc<dyn SessionStore>,
    code: &LobbyCode,
) -> Result<Option<LobbySnapshot>, ServiceError> {
    let session = store.load_snapshot(code.to_string()).await?;
    Ok(session.map(Into::into))
}

async fn load_snapshot(
    store: &Arc<dyn SessionStore>,
    code: &LobbyCode,
) -> Result<LobbySnapshot, ServiceError> {
    find_snapshot(store, code)
        .await?
        .ok_or_else(|| lobby_not_found(code))
}

/// Write `next` if the lobby is still at `expected_version`.
async fn commit(
    store: &Arc<dyn SessionStore>,
    expected_version: u64,
    mut next: LobbySnapshot,
) -> Result<LobbySnapshot, ServiceError> {
    let version = store
        .commit(expected_version, next.clone().into())
        .await?;
    next.lobby.version = version;
    Ok(next)
}

/// Re-read the lobby after a plain write and push it to subscribers.
async fn publish_latest(
    state: &SharedState,
    store: &Arc<dyn SessionStore>,
    code: &LobbyCode,
) -> Result<LobbySnapshot, ServiceError> {
    let snapshot = load_snapshot(store, code).await?;
    state.hub().publish(snapshot.clone());
    Ok(snapshot)
}

fn publish_view(
    state: &SharedState,
    snapshot: LobbySnapshot,
    caller: &str,
    now: SystemTime,
) -> LobbyView {
    let view = project(&snapshot, Some(caller), now);
    state.hub().publish(snapshot);
    view
}

fn ensure_host(lobby: &Lobby, caller: &str, action: &str) -> Result<(), ServiceError> {
    if lobby.is_host(caller) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "only the host can {action}"
        )))
    }
}

fn lobby_not_found(code: &LobbyCode) -> ServiceError {
    ServiceError::NotFound(format!("lobby `{code}` not found"))
}
