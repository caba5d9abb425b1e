use thiserror::Error;

use crate::ConnectionId;

/// Failure inside one matching task. Converted to a `processing_error`
/// response targeted at the originating connection only.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("face extraction failed: {0}")]
    Extraction(String),
    #[error("reference population unavailable: {0}")]
    ReferenceStore(#[source] StoreError),
    #[error("attendance store error: {0}")]
    AttendanceStore(#[source] StoreError),
    #[error("matching task panicked")]
    TaskPanicked,
}

/// Rejection at the submission boundary, before any work is queued.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("connection {connection_id} already has {pending} tasks in flight")]
    Busy {
        connection_id: ConnectionId,
        pending: usize,
    },
    #[error("pipeline is shutting down")]
    ShuttingDown,
}

/// Error from an external store collaborator (reference population,
/// attendance records). Opaque to the pipeline; carried for logs and
/// error responses.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError(e.to_string())
    }
}

/// One best-effort send to a connection failed. Recovered locally by
/// evicting the connection; never propagated to other connections.
#[derive(Error, Debug)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);
