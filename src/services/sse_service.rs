use std::{convert::Infallible, time::{Duration, SystemTime}};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
    dto::sse::{LOBBY_STATE_EVENT, ServerEvent},
    error::ServiceError,
    services::{lobby_service, projection::project},
    state::{
        SharedState,
        lobby::{LobbyCode, LobbySnapshot},
    },
};

/// Subscribe `viewer` to the state pushes of lobby `code`.
///
/// The receiver is taken before the current state is read so no change made
/// in between is lost; the first event of the stream is that current state.
pub async fn subscribe(
    state: &SharedState,
    code: &str,
    viewer: Option<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let code = LobbyCode::parse(code)?;
    let receiver = state.hub().subscribe(code.as_str());
    let initial = match lobby_service::current_snapshot(state, &code).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            drop(receiver);
            state.hub().prune(code.as_str());
            return Err(err);
        }
    };
    debug!(code = %code, viewer = ?viewer, "lobby stream opened");
    Ok(to_sse_stream(state.clone(), receiver, initial, viewer))
}

/// Project a snapshot for `viewer` and wrap it in a `lobby.state` event.
fn lobby_event(snapshot: &LobbySnapshot, viewer: Option<&str>) -> Option<Event> {
    let view = project(snapshot, viewer, SystemTime::now());
    match ServerEvent::json(LOBBY_STATE_EVENT.to_string(), &view) {
        Ok(payload) => {
            let mut event = Event::default().data(payload.data);
            if let Some(name) = payload.event {
                event = event.event(name);
            }
            Some(event)
        }
        Err(err) => {
            warn!(code = %snapshot.lobby.code, error = %err, "failed to serialise lobby view");
            None
        }
    }
}

/// Convert a broadcast receiver into an SSE response, forwarding each lobby
/// change as the viewer's projection until the client disconnects.
///
/// The lobby channel is pruned from the hub once the forwarder stops.
pub fn to_sse_stream(
    state: SharedState,
    receiver: broadcast::Receiver<LobbySnapshot>,
    initial: LobbySnapshot,
    viewer: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let code = initial.lobby.code.clone();
        forward(tx, receiver, initial, viewer).await;
        state.hub().prune(code.as_str());
        debug!(code = %code, "lobby stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Push `initial`, then every published snapshot, until either side goes away.
/// Returning drops the receiver.
async fn forward(
    tx: mpsc::Sender<Result<Event, Infallible>>,
    mut receiver: broadcast::Receiver<LobbySnapshot>,
    initial: LobbySnapshot,
    viewer: Option<String>,
) {
    if let Some(event) = lobby_event(&initial, viewer.as_deref()) {
        if tx.send(Ok(event)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = tx.closed() => return,
            recv_result = receiver.recv() => {
                match recv_result {
                    Ok(snapshot) => {
                        let Some(event) = lobby_event(&snapshot, viewer.as_deref()) else {
                            continue;
                        };
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                    // Every push is a full view, the next one catches up.
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(code = %initial.lobby.code, skipped, "lobby stream lagged");
                        continue;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::session_store::memory::MemorySessionStore, state::AppState,
    };

    #[tokio::test]
    async fn unknown_lobbies_cannot_be_watched() {
        let state = AppState::new(AppConfig::default());
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;

        let err = subscribe(&state, "NOPE00", None).await.err().unwrap();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = subscribe(&state, "bad", None).await.err().unwrap();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn subscribing_registers_a_receiver() {
        let state = AppState::new(AppConfig::default());
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let (code, _) = lobby_service::create_lobby(&state, "host", None)
            .await
            .unwrap();

        let _sse = subscribe(&state, code.as_str(), Some("host".into()))
            .await
            .unwrap();
        assert_eq!(state.hub().subscriber_count(code.as_str()), 1);
    }

    #[tokio::test]
    async fn failed_subscriptions_leave_no_channel() {
        let state = AppState::new(AppConfig::default());
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;

        for n in 0..100 {
            let code = format!("NOP{n:03}");
            assert!(subscribe(&state, &code, None).await.is_err());
        }
        assert_eq!(state.hub().channel_count(), 0);
    }

    #[tokio::test]
    async fn closed_streams_release_their_channel() {
        let state = AppState::new(AppConfig::default());
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let (code, _) = lobby_service::create_lobby(&state, "host", None)
            .await
            .unwrap();

        let sse = subscribe(&state, code.as_str(), None).await.unwrap();
        assert_eq!(state.hub().channel_count(), 1);
        drop(sse);

        tokio::time::timeout(Duration::from_secs(1), async {
            while state.hub().channel_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(state.hub().subscriber_count(code.as_str()), 0);
    }
}
