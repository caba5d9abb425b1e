//! Contracts for the external collaborators the pipeline consumes.
//!
//! Detection, persistence, and transport are deliberately outside this
//! crate; each is reached through one narrow trait so the pipeline can be
//! exercised against in-memory doubles.

use async_trait::async_trait;
use attend_core::messages::OutboundMessage;
use attend_core::{DetectedFace, ReferenceIdentity};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DeliveryError, StoreError};

/// Opaque face detector/embedder: `image -> list of (embedding, bbox)`.
///
/// May return an empty list; not guaranteed deterministic across backend
/// versions. CPU-bound and synchronous — always invoked on a pool worker.
pub trait FaceExtractor: Send + Sync {
    fn extract(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, String>;
}

/// Extractor stand-in used until a real detection backend is wired in.
/// Reports zero faces, so every submission resolves as `no_face_detected`.
pub struct NoopExtractor;

impl FaceExtractor for NoopExtractor {
    fn extract(&self, _image: &DynamicImage) -> Result<Vec<DetectedFace>, String> {
        tracing::debug!("no extraction backend configured; reporting zero faces");
        Ok(Vec::new())
    }
}

/// Bulk read of the reference population backing the directory cache.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn load_reference_population(&self) -> Result<Vec<ReferenceIdentity>, StoreError>;
}

/// One attendance row, as the store reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub id: Uuid,
    pub user_id: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub similarity: f32,
    pub is_late: bool,
    pub is_early_exit: bool,
}

/// Configured office hours, if any. Lateness and early-exit judgements
/// are skipped for whichever side is unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfficeTimings {
    pub login: Option<NaiveTime>,
    pub logout: Option<NaiveTime>,
}

/// Attendance record persistence, consumed by the attendance policy.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// The user's attendance row for the given day, if one exists.
    async fn today_record(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRow>, StoreError>;

    async fn insert_entry(
        &self,
        user_id: &str,
        similarity: f32,
        timestamp: DateTime<Utc>,
        is_late: bool,
    ) -> Result<AttendanceRow, StoreError>;

    async fn mark_exit(
        &self,
        row_id: Uuid,
        exit_time: DateTime<Utc>,
        is_early_exit: bool,
    ) -> Result<(), StoreError>;

    async fn office_timings(&self) -> Result<OfficeTimings, StoreError>;
}

/// One best-effort send to a live connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}
