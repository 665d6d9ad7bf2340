//! In-process job lifecycle events
//!
//! The dispatcher and the worker pool publish [`JobEvent`]s on a broadcast
//! channel. Emitting never blocks: with no subscribers the event is dropped,
//! and a subscriber that falls behind loses the oldest events first.
//!
//! # Example
//!
//! ```
//! use libcrosspost::events::{EventBus, JobEvent};
//! use uuid::Uuid;
//!
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//! bus.emit(JobEvent::Enqueued {
//!     job_id: Uuid::new_v4(),
//!     platform: "Twitter".to_string(),
//!     client_id: "default".to_string(),
//! });
//! assert!(receiver.try_recv().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type EventReceiver = broadcast::Receiver<JobEvent>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before lagging events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: JobEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Enqueued {
        job_id: Uuid,
        platform: String,
        client_id: String,
    },

    Started {
        job_id: Uuid,
        platform: String,
        attempt: u32,
    },

    Retrying {
        job_id: Uuid,
        platform: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    Succeeded {
        job_id: Uuid,
        platform: String,
        attempt: u32,
    },

    /// Terminal failure
    Failed {
        job_id: Uuid,
        platform: String,
        attempt: u32,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Enqueued { job_id, .. }
            | JobEvent::Started { job_id, .. }
            | JobEvent::Retrying { job_id, .. }
            | JobEvent::Succeeded { job_id, .. }
            | JobEvent::Failed { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Succeeded { .. } | JobEvent::Failed { .. })
    }
}
