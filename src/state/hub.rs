use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::state::lobby::LobbySnapshot;

/// Per-lobby broadcast channels carrying the latest lobby snapshot.
///
/// Each subscriber projects the snapshot for its own viewer, so the hub never
/// holds viewer specific data.
pub struct LobbyHub {
    channels: DashMap<String, broadcast::Sender<LobbySnapshot>>,
    capacity: usize,
}

impl LobbyHub {
    /// Build an empty hub whose lobby channels buffer `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber for `code`, creating the channel on first use.
    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<LobbySnapshot> {
        self.channels
            .entry(code.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send a snapshot to the current subscribers of its lobby.
    ///
    /// Channels nobody listens to anymore are dropped.
    pub fn publish(&self, snapshot: LobbySnapshot) {
        let code = snapshot.lobby.code.as_str().to_string();
        let delivered = match self.channels.get(&code) {
            Some(sender) => sender.send(snapshot).is_ok(),
            None => return,
        };
        if !delivered {
            self.channels
                .remove_if(&code, |_, sender| sender.receiver_count() == 0);
        }
    }

    /// Drop the channel of `code` once its last receiver is gone.
    pub fn prune(&self, code: &str) {
        self.channels
            .remove_if(code, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of lobbies that currently own a channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of live subscribers of `code`.
    pub fn subscriber_count(&self, code: &str) -> usize {
        self.channels
            .get(code)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
