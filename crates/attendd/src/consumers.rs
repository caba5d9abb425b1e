//! The two background loops draining the queue relay.
//!
//! Drains use recv-with-timeout rather than sleep-and-peek polling: same
//! 100 ms maximum latency, no busy wake-ups. A consumer-side error is
//! logged and followed by a 1 s backoff; the loops themselves run for the
//! life of the process and stop only once every producer is gone.

use std::sync::Arc;
use std::time::Duration;

use attend_core::messages::{
    EventEnvelope, NotificationKind, OutboundMessage, ResponseStatus,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::registry::ConnectionRegistry;
use crate::relay::{BroadcastEvent, ConnectionResponse, ResponseBody, TaskOutput};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Drain the response queue: classify each result and deliver it to the
/// originating connection; state changes are forwarded to the event queue
/// for broadcast.
pub async fn run_response_consumer(
    mut rx: mpsc::Receiver<ConnectionResponse>,
    registry: Arc<ConnectionRegistry>,
    events: mpsc::Sender<BroadcastEvent>,
) {
    tracing::info!("response consumer started");
    loop {
        match timeout(POLL_INTERVAL, rx.recv()).await {
            // Nothing within the poll window.
            Err(_) => continue,
            // Every producer dropped: process shutdown.
            Ok(None) => break,
            Ok(Some(response)) => {
                if let Err(err) = handle_response(response, &registry, &events).await {
                    tracing::error!(error = %err, "response consumer error, backing off");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
    tracing::info!("response consumer stopped");
}

async fn handle_response(
    response: ConnectionResponse,
    registry: &ConnectionRegistry,
    events: &mpsc::Sender<BroadcastEvent>,
) -> Result<(), mpsc::error::SendError<BroadcastEvent>> {
    let connection_id = response.connection_id;
    // A gone submitter only loses its targeted response. Attendance changes
    // the job already committed still reach the event queue below.
    let connected = registry.contains(connection_id);
    if !connected {
        tracing::debug!(%connection_id, "submitter disconnected, skipping targeted response");
    }

    match response.body {
        ResponseBody::Error(message) => {
            if connected {
                registry
                    .deliver(
                        connection_id,
                        &ResponseStatus::ProcessingError {
                            message: message.clone(),
                        }
                        .into(),
                    )
                    .await;
                registry
                    .deliver(
                        connection_id,
                        &OutboundMessage::notification(
                            NotificationKind::Error,
                            format!("Error processing: {message}"),
                        ),
                    )
                    .await;
            }
        }
        ResponseBody::Output(output) => {
            if connected {
                respond_with_output(connection_id, &output, registry).await;
            }
            if !output.updates.is_empty() {
                events.send(BroadcastEvent::Attendance(output.updates)).await?;
            }
        }
    }
    Ok(())
}

/// Targeted status and notification for one task's output.
async fn respond_with_output(
    connection_id: crate::ConnectionId,
    output: &TaskOutput,
    registry: &ConnectionRegistry,
) {
    if output.processed.is_empty() {
        let (status, note) = if output.faces_detected == 0 {
            (
                ResponseStatus::NoFaceDetected,
                "No face detected in the image",
            )
        } else {
            (ResponseStatus::NoMatchingUsers, "No matching users found")
        };
        registry.deliver(connection_id, &status.into()).await;
        registry
            .deliver(
                connection_id,
                &OutboundMessage::notification(NotificationKind::Warning, note),
            )
            .await;
        return;
    }

    let summary = if output.processed.len() == 1 {
        let user = &output.processed[0];
        format!("Face detected: {} (ID: {})", user.name, user.user_id)
    } else {
        format!(
            "Multiple faces detected: {} people identified",
            output.processed.len()
        )
    };

    registry
        .deliver(
            connection_id,
            &ResponseStatus::MultipleUsers {
                users: output.processed.clone(),
            }
            .into(),
        )
        .await;
    registry
        .deliver(
            connection_id,
            &OutboundMessage::notification(NotificationKind::Success, summary),
        )
        .await;
}

/// Drain the event queue: render each domain event as a typed envelope and
/// fan it out to every registered connection.
pub async fn run_event_consumer(
    mut rx: mpsc::Receiver<BroadcastEvent>,
    registry: Arc<ConnectionRegistry>,
) {
    tracing::info!("event consumer started");
    loop {
        match timeout(POLL_INTERVAL, rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(BroadcastEvent::Attendance(data))) => {
                tracing::debug!(updates = data.len(), "broadcasting attendance update");
                let message: OutboundMessage = EventEnvelope::AttendanceUpdate { data }.into();
                registry.broadcast(&message).await;
            }
        }
    }
    tracing::info!("event consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::IoPool;
    use crate::relay::{queues, TaskOutput};
    use crate::testutil::MockTransport;
    use attend_core::messages::{AttendanceAction, AttendanceEvent, ProcessedUser};

    fn processed(name: &str) -> ProcessedUser {
        ProcessedUser {
            user_id: "emp-1".into(),
            name: name.into(),
            message: "Entry marked successfully".into(),
            similarity: 0.9,
            timestamp: None,
            entry_time: None,
            exit_time: None,
        }
    }

    fn output(processed_users: Vec<ProcessedUser>, faces: usize) -> ResponseBody {
        ResponseBody::Output(TaskOutput {
            processed: processed_users,
            updates: Vec::new(),
            faces_detected: faces,
        })
    }

    async fn classify(body: ResponseBody) -> Vec<OutboundMessage> {
        let registry = Arc::new(ConnectionRegistry::new(
            IoPool::new(4),
            Duration::from_secs(300),
        ));
        let transport = MockTransport::new(false);
        let connection_id = registry.register(transport.clone());
        let (relay, _receivers) = queues(10);

        handle_response(
            ConnectionResponse {
                connection_id,
                body,
            },
            &registry,
            &relay.events,
        )
        .await
        .unwrap();
        transport.messages()
    }

    fn status_tag(message: &OutboundMessage) -> String {
        serde_json::to_value(message).unwrap()["status"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn zero_faces_is_no_face_detected() {
        let messages = classify(output(Vec::new(), 0)).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(status_tag(&messages[0]), "no_face_detected");
    }

    #[tokio::test]
    async fn faces_without_matches_is_no_matching_users() {
        let messages = classify(output(Vec::new(), 2)).await;
        assert_eq!(status_tag(&messages[0]), "no_matching_users");
    }

    #[tokio::test]
    async fn error_body_becomes_processing_error() {
        let messages = classify(ResponseBody::Error("model exploded".into())).await;
        assert_eq!(status_tag(&messages[0]), "processing_error");
        let note = serde_json::to_value(&messages[1]).unwrap();
        assert_eq!(note["notification_type"], "error");
    }

    #[tokio::test]
    async fn singular_and_plural_notifications() {
        let messages = classify(output(vec![processed("Asha")], 1)).await;
        let note = serde_json::to_value(&messages[1]).unwrap();
        assert!(note["message"]
            .as_str()
            .unwrap()
            .starts_with("Face detected: Asha"));

        let messages = classify(output(vec![processed("Asha"), processed("Ben")], 2)).await;
        let note = serde_json::to_value(&messages[1]).unwrap();
        assert_eq!(
            note["message"],
            "Multiple faces detected: 2 people identified"
        );
    }

    #[tokio::test]
    async fn response_to_missing_connection_is_dropped() {
        let registry = Arc::new(ConnectionRegistry::new(
            IoPool::new(4),
            Duration::from_secs(300),
        ));
        let (relay, mut receivers) = queues(10);
        // Must not error; the connection simply went away first. With no
        // state changes in the output there is nothing to broadcast either.
        handle_response(
            ConnectionResponse {
                connection_id: uuid::Uuid::new_v4(),
                body: output(Vec::new(), 0),
            },
            &registry,
            &relay.events,
        )
        .await
        .unwrap();
        assert!(receivers.events.try_recv().is_err());
    }

    fn entry_event() -> AttendanceEvent {
        AttendanceEvent {
            action: AttendanceAction::Entry,
            user_id: "emp-1".into(),
            name: "Asha".into(),
            timestamp: chrono::Utc::now(),
            similarity: 0.9,
            entry_time: Some(chrono::Utc::now()),
            exit_time: None,
            is_late: Some(false),
            late_message: None,
            minutes_late: None,
            is_early_exit: None,
            early_exit_message: None,
        }
    }

    #[tokio::test]
    async fn disconnected_submitter_still_broadcasts_updates() {
        let registry = Arc::new(ConnectionRegistry::new(
            IoPool::new(4),
            Duration::from_secs(300),
        ));
        let (relay, mut receivers) = queues(10);

        // The attendance entry was committed by the pool job; the submitter
        // going away must not suppress the broadcast to everyone else.
        handle_response(
            ConnectionResponse {
                connection_id: uuid::Uuid::new_v4(),
                body: ResponseBody::Output(TaskOutput {
                    processed: vec![processed("Asha")],
                    updates: vec![entry_event()],
                    faces_detected: 1,
                }),
            },
            &registry,
            &relay.events,
        )
        .await
        .unwrap();

        let BroadcastEvent::Attendance(data) = receivers.events.try_recv().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].user_id, "emp-1");
    }
}
