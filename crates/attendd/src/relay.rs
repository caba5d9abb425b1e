//! Queue relay: the two bounded queues between task completion and the
//! consumer loops.
//!
//! Bounded capacity is the system's only backpressure signal. Completion
//! handlers run on pool threads and use `blocking_send`, so a full queue
//! stalls the worker, which throttles how fast completions are accepted.
//! FIFO within each queue; no ordering across the two.

use attend_core::messages::{AttendanceEvent, ProcessedUser};
use tokio::sync::mpsc;

use crate::ConnectionId;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Result of one matching task, before response classification.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    /// One entry per matched identity, state-changing or not.
    pub processed: Vec<ProcessedUser>,
    /// State changes destined for broadcast.
    pub updates: Vec<AttendanceEvent>,
    /// Distinguishes "no faces in the frame" from "faces, none matched".
    pub faces_detected: usize,
}

#[derive(Debug)]
pub enum ResponseBody {
    Output(TaskOutput),
    Error(String),
}

/// Per-connection response relayed to the response consumer.
#[derive(Debug)]
pub struct ConnectionResponse {
    pub connection_id: ConnectionId,
    pub body: ResponseBody,
}

/// Domain event relayed to the event consumer for fan-out.
#[derive(Debug)]
pub enum BroadcastEvent {
    Attendance(Vec<AttendanceEvent>),
}

/// Producer half of both queues.
#[derive(Clone)]
pub struct QueueRelay {
    pub events: mpsc::Sender<BroadcastEvent>,
    pub responses: mpsc::Sender<ConnectionResponse>,
}

/// Consumer half, handed to the two consumer loops at startup.
pub struct QueueReceivers {
    pub events: mpsc::Receiver<BroadcastEvent>,
    pub responses: mpsc::Receiver<ConnectionResponse>,
}

pub fn queues(capacity: usize) -> (QueueRelay, QueueReceivers) {
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (responses_tx, responses_rx) = mpsc::channel(capacity);
    (
        QueueRelay {
            events: events_tx,
            responses: responses_tx,
        },
        QueueReceivers {
            events: events_rx,
            responses: responses_rx,
        },
    )
}
