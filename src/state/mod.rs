pub mod elimination;
pub mod finale;
mod hub;
pub mod lobby;
pub mod scheduler;
pub mod state_machine;
pub mod tally;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::{
    sync::{RwLock, watch},
    task::JoinHandle,
};

use crate::{config::AppConfig, dao::session_store::SessionStore, error::ServiceError};

pub use self::hub::LobbyHub;

/// Pending expiry task of a lobby's current round.
pub struct ArmedTimer {
    /// Round the task will try to close.
    pub round: u32,
    pub handle: JoinHandle<()>,
}

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, notification hub and round timers.
///
/// Lobby data itself lives in the session store; nothing here caches it.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    hub: LobbyHub,
    round_timers: DashMap<String, ArmedTimer>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            hub: LobbyHub::new(config.hub_capacity()),
            round_timers: DashMap::new(),
            degraded: degraded_tx,
            config,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`AppState::session_store`] but fails with [`ServiceError::Degraded`]
    /// while no backend is available.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if *self.degraded.borrow() {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn install_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Per-lobby broadcast hub feeding the SSE streams.
    pub fn hub(&self) -> &LobbyHub {
        &self.hub
    }

    /// Registry of pending round expiry tasks keyed by lobby code.
    pub fn round_timers(&self) -> &DashMap<String, ArmedTimer> {
        &self.round_timers
    }

    /// Runtime configuration loaded at startup.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
