use crate::protocol::StreamID;
use crate::stream::Stream;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent index of a connection's live streams.
#[derive(Debug, Default)]
pub(crate) struct StreamMap {
    map: DashMap<StreamID, Arc<Stream>>,
}

impl StreamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, stream: Arc<Stream>) {
        self.map.insert(stream.id(), stream);
    }

    pub fn get(&self, stream_id: StreamID) -> Option<Arc<Stream>> {
        self.map.get(&stream_id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, stream_id: StreamID) {
        self.map.remove(&stream_id);
    }

    /// Snapshot of every stream, for broadcast close.
    pub fn all(&self) -> Vec<Arc<Stream>> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }
}
