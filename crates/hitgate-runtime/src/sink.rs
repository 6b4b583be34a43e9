//! Output side of the collector: encoders, buffer caches and request sinks.
//!
//! Every finalized request is encoded into one buffer and handed to a
//! [`RequestSink`]. Sinks are shared between collectors, so they must accept
//! buffers from several workers at once.

use crate::error::SinkError;
use hitgate_core::TriggerRequest;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Destination for encoded trigger requests.
pub trait RequestSink: Send + Sync {
    /// Name of this sink
    fn name(&self) -> &str;

    /// Take ownership of one encoded request.
    fn receive(&self, buffer: Vec<u8>) -> Result<(), SinkError>;
}

/// Source of outgoing buffers.
pub trait BufferCache: Send + Sync {
    /// A buffer with at least `len` bytes of capacity.
    fn acquire(&self, len: usize) -> Vec<u8>;
}

/// Serialises a request into a buffer.
pub trait RequestEncoder: Send + Sync {
    /// Expected encoded size, used to size the buffer up front.
    fn encoded_len(&self, request: &TriggerRequest) -> usize;

    fn encode(&self, request: &TriggerRequest, buffer: &mut Vec<u8>) -> Result<(), SinkError>;
}

/// JSON encoding of requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl RequestEncoder for JsonEncoder {
    fn encoded_len(&self, request: &TriggerRequest) -> usize {
        256 + 96 * request.elements.len() + 64 * request.hits.len()
    }

    fn encode(&self, request: &TriggerRequest, buffer: &mut Vec<u8>) -> Result<(), SinkError> {
        serde_json::to_writer(&mut *buffer, request)?;
        Ok(())
    }
}

/// Allocates fresh buffers and counts them.
#[derive(Debug, Default)]
pub struct CountingBufferCache {
    acquired: AtomicU64,
}

impl CountingBufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }
}

impl BufferCache for CountingBufferCache {
    fn acquire(&self, len: usize) -> Vec<u8> {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(len)
    }
}

/// Forwards buffers over a tokio channel.
pub struct ChannelSink {
    name: String,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl RequestSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&self, buffer: Vec<u8>) -> Result<(), SinkError> {
        self.tx
            .send(buffer)
            .map_err(|_| SinkError::Closed(self.name.clone()))
    }
}

/// Keeps every buffer in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    name: String,
    buffers: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffers: Arc::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode all received buffers back into requests.
    pub fn requests(&self) -> Result<Vec<TriggerRequest>, SinkError> {
        let buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        buffers
            .iter()
            .map(|b| serde_json::from_slice(b).map_err(SinkError::from))
            .collect()
    }
}

impl RequestSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&self, buffer: Vec<u8>) -> Result<(), SinkError> {
        self.buffers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitgate_core::{Interval, SourceId, TriggerKind};

    fn request() -> TriggerRequest {
        TriggerRequest::new(
            3,
            TriggerKind::SimpleMajority,
            1,
            SourceId::INICE_TRIGGER,
            Interval::ticks(10, 40),
        )
    }

    #[test]
    fn test_json_encoder() {
        let mut buf = Vec::new();
        JsonEncoder.encode(&request(), &mut buf).unwrap();
        let decoded: TriggerRequest = serde_json::from_slice(&buf).unwrap();
        assert_eq!(decoded, request());
    }

    #[test]
    fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new("out");
        sink.receive(vec![1, 2, 3]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);
        drop(rx);
        assert!(matches!(sink.receive(vec![4]), Err(SinkError::Closed(_))));
    }

    #[test]
    fn test_memory_sink_is_shared() {
        let sink = MemorySink::new("mem");
        let handle = sink.clone();
        let mut buf = Vec::new();
        JsonEncoder.encode(&request(), &mut buf).unwrap();
        sink.receive(buf).unwrap();
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.requests().unwrap()[0].uid, 3);
    }

    #[test]
    fn test_buffer_cache_counts() {
        let cache = CountingBufferCache::new();
        let buf = cache.acquire(64);
        assert!(buf.capacity() >= 64);
        assert_eq!(cache.acquired(), 1);
    }
}
