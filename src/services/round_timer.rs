use std::time::SystemTime;

use tokio::{sync::oneshot, time::sleep};
use tracing::{debug, warn};

use crate::{
    services::lobby_service,
    state::{ArmedTimer, SharedState, lobby::LobbyCode, scheduler},
};

/// Schedule the close of `round` at `deadline`, replacing any pending timer of
/// the same lobby.
///
/// The expiry itself is round-guarded, so a stale or duplicated timer firing
/// late changes nothing. The task waits until it is registered, so its own
/// unregistering can never run first.
pub fn arm(state: &SharedState, code: &LobbyCode, round: u32, deadline: SystemTime) {
    let delay = scheduler::remaining(deadline, SystemTime::now());
    let task_state = state.clone();
    let task_code = code.clone();
    let (registered_tx, registered_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        if registered_rx.await.is_err() {
            return;
        }
        sleep(delay).await;
        match lobby_service::expire_round(&task_state, &task_code, round).await {
            Ok(true) => debug!(code = %task_code, round, "round timer closed the round"),
            Ok(false) => debug!(code = %task_code, round, "round already moved on"),
            Err(err) => {
                warn!(code = %task_code, round, error = %err, "failed to close expired round")
            }
        }
        task_state
            .round_timers()
            .remove_if(task_code.as_str(), |_, timer| timer.round == round);
    });

    if let Some(previous) = state
        .round_timers()
        .insert(code.to_string(), ArmedTimer { round, handle })
    {
        previous.handle.abort();
    }
    // Err only if the task was already aborted.
    let _ = registered_tx.send(());
}

/// Drop the pending timer of a lobby, if any.
pub fn cancel(state: &SharedState, code: &LobbyCode) {
    if let Some((_, timer)) = state.round_timers().remove(code.as_str()) {
        timer.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::{SessionStore, memory::MemorySessionStore},
        state::{AppState, lobby::LobbySnapshot, state_machine::LobbyPhase},
    };

    async fn overdue_lobby() -> (SharedState, Arc<MemorySessionStore>, LobbyCode, SystemTime) {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemorySessionStore::new());
        state.install_session_store(store.clone()).await;

        let (code, _) = lobby_service::create_lobby(&state, "host", None)
            .await
            .unwrap();
        lobby_service::start_game(&state, code.as_str(), "host")
            .await
            .unwrap();
        cancel(&state, &code);

        let snapshot: LobbySnapshot = store
            .load_snapshot(code.to_string())
            .await
            .unwrap()
            .unwrap()
            .into();
        let deadline = SystemTime::now() - Duration::from_secs(1);
        let mut overdue = snapshot.clone();
        overdue.lobby.round_deadline = Some(deadline);
        store
            .commit(snapshot.lobby.version, overdue.into())
            .await
            .unwrap();
        (state, store, code, deadline)
    }

    async fn phase(store: &MemorySessionStore, code: &LobbyCode) -> LobbyPhase {
        LobbySnapshot::from(store.load_snapshot(code.to_string()).await.unwrap().unwrap())
            .lobby
            .phase
    }

    #[tokio::test]
    async fn fired_timer_closes_the_round_and_unregisters() {
        let (state, store, code, deadline) = overdue_lobby().await;
        arm(&state, &code, 1, deadline);

        for _ in 0..50 {
            if !state.round_timers().contains_key(code.as_str()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!state.round_timers().contains_key(code.as_str()));
        assert_eq!(phase(&store, &code).await, LobbyPhase::Voting);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overdue_timers_unregister_after_firing() {
        let (state, store, code, deadline) = overdue_lobby().await;
        arm(&state, &code, 1, deadline);

        // The task unregisters itself before finishing, so a registered
        // timer is never seen finished.
        loop {
            let finished = state
                .round_timers()
                .get(code.as_str())
                .map(|timer| timer.handle.is_finished());
            match finished {
                None => break,
                Some(finished) => assert!(!finished, "finished timer left registered"),
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(phase(&store, &code).await, LobbyPhase::Voting);
    }

    #[tokio::test]
    async fn stale_round_timer_changes_nothing() {
        let (state, store, code, deadline) = overdue_lobby().await;
        let handle = {
            arm(&state, &code, 7, deadline);
            state.round_timers().remove(code.as_str()).unwrap().1.handle
        };
        handle.await.unwrap();
        assert_eq!(phase(&store, &code).await, LobbyPhase::Playing);
    }

    #[tokio::test]
    async fn cancel_aborts_the_pending_task() {
        let (state, store, code, _) = overdue_lobby().await;
        arm(&state, &code, 1, SystemTime::now() + Duration::from_secs(3600));
        cancel(&state, &code);
        assert!(state.round_timers().is_empty());
        assert_eq!(phase(&store, &code).await, LobbyPhase::Playing);
    }
}
