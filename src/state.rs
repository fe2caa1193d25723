use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use crate::feed::{Feed, StationUpdate};
use crate::reading::Reading;

/// Latest reading per station.
///
/// Each entry is replaced as a whole; readers get a shared handle to one
/// complete reading, never a mix of two.
#[derive(Clone, Default)]
pub struct StationRegistry {
    stations: Arc<DashMap<String, Arc<Reading>>>,
}

impl StationRegistry {
    /// Stores `reading` under `station_id`, dropping whatever was there.
    pub fn put(&self, station_id: impl Into<String>, reading: Reading) {
        self.stations.insert(station_id.into(), Arc::new(reading));
    }

    pub fn get(&self, station_id: &str) -> Option<Arc<Reading>> {
        self.stations.get(station_id).map(|guard| Arc::clone(guard.value()))
    }

    pub fn snapshot(&self) -> HashMap<String, Arc<Reading>> {
        self.stations
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// State shared by every connection task.
#[derive(Clone, Default)]
pub struct ServerState {
    pub registry: StationRegistry,
    pub feed: Feed,
    active: Arc<AtomicUsize>,
    accepted: Arc<AtomicU64>,
}

impl ServerState {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            feed: Feed::new(feed_capacity),
            ..Self::default()
        }
    }

    /// Stores a reading keyed by its `station_id` and tells viewers about it.
    ///
    /// Returns the id it was stored under, or `None` when the reading has no
    /// `station_id` and was not stored.
    pub fn store(&self, reading: Reading) -> Option<String> {
        let station_id = reading.station_id.clone()?;

        self.registry.put(station_id.clone(), reading.clone());
        self.feed.send(StationUpdate {
            station_id: station_id.clone(),
            reading,
        });

        Some(station_id)
    }

    /// Counts a newly accepted connection until the returned guard drops.
    pub fn connection_opened(&self) -> ConnectionGuard {
        let id = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        self.active.fetch_add(1, Ordering::Relaxed);

        ConnectionGuard {
            id,
            active: Arc::clone(&self.active),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn accepted_total(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    id: u64,
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    /// Sequence number of this connection since startup, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}
