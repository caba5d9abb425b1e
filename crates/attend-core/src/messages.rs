//! Wire message shapes delivered to connections.
//!
//! Two families share one outbound type: typed event envelopes (tagged by
//! `type`) carrying broadcasts, notifications, and keep-alive pings, and
//! per-response statuses (tagged by `status`) answering one submitted image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a human-readable notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// What a state-changing attendance event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceAction {
    Entry,
    Exit,
}

/// One attendance state change, broadcast to every connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub action: AttendanceAction,
    pub user_id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_late: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub late_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_late: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_early_exit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_exit_message: Option<String>,
}

/// Per-identity outcome reported back to the submitting connection.
///
/// Produced for every matched face, whether or not the match changed state
/// (an "entry already marked" outcome reports here but broadcasts nothing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedUser {
    pub user_id: String,
    pub name: String,
    pub message: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,
}

/// Broadcast and notification envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    AttendanceUpdate { data: Vec<AttendanceEvent> },
    Notification {
        notification_type: NotificationKind,
        message: String,
    },
    Ping,
}

/// Status answering one submitted image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseStatus {
    NoFaceDetected,
    NoMatchingUsers,
    MultipleUsers { users: Vec<ProcessedUser> },
    ProcessingError { message: String },
}

/// Anything the registry can hand to a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Event(EventEnvelope),
    Response(ResponseStatus),
}

impl From<EventEnvelope> for OutboundMessage {
    fn from(e: EventEnvelope) -> Self {
        OutboundMessage::Event(e)
    }
}

impl From<ResponseStatus> for OutboundMessage {
    fn from(s: ResponseStatus) -> Self {
        OutboundMessage::Response(s)
    }
}

impl OutboundMessage {
    /// Notification envelope shorthand.
    pub fn notification(kind: NotificationKind, message: impl Into<String>) -> Self {
        EventEnvelope::Notification {
            notification_type: kind,
            message: message.into(),
        }
        .into()
    }
}
