//! Fan-out of `(message, fraction)` progress events. Non-blocking, lossy
//! allowed under load — grounded directly on `events/bus.rs::EventBus`'s
//! broadcast-channel semantics ("no receivers" is not an error).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    pub fraction: f64,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &str, fraction: f64);
}

/// Broadcasts to any number of subscribers via a bounded `tokio::sync::broadcast`
/// channel. A slow subscriber lags and drops old events rather than blocking
/// the publisher — this is what makes `emit` non-blocking.
pub struct BroadcastProgressSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgressSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for BroadcastProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BroadcastProgressSink {
    fn emit(&self, message: &str, fraction: f64) {
        // `send` returning Err just means no receivers are subscribed; that's
        // a normal, non-error state for a progress stream.
        let _ = self.sender.send(ProgressEvent { message: message.to_string(), fraction });
    }
}

/// No-op sink for runs that don't care about progress (CLI demo default,
/// most unit tests).
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _message: &str, _fraction: f64) {}
}
