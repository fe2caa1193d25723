//! Live stream of station updates for viewers.

use tokio::sync::broadcast;

use crate::reading::Reading;

#[derive(Debug, Clone, PartialEq)]
pub struct StationUpdate {
    pub station_id: String,
    pub reading: Reading,
}

#[derive(Clone)]
pub struct Feed {
    tx: broadcast::Sender<StationUpdate>,
}

impl Feed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));

        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationUpdate> {
        self.tx.subscribe()
    }

    /// Publishes to current subscribers. Having none is fine.
    pub fn send(&self, update: StationUpdate) {
        let _ = self.tx.send(update);
    }

}

impl Default for Feed {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FEED_CAPACITY)
    }
}
