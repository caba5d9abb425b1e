//! Bundled collaborator adapters: a JSON-snapshot reference store and an
//! in-memory attendance store. Real deployments substitute their own
//! implementations of the traits in [`crate::traits`].

use std::path::PathBuf;

use async_trait::async_trait;
use attend_core::ReferenceIdentity;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::traits::{AttendanceRow, AttendanceStore, OfficeTimings, ReferenceStore};

/// Reference population loaded wholesale from one JSON file: an array of
/// `{ id, display_name, embedding: { values } }` objects.
pub struct JsonReferenceStore {
    path: PathBuf,
}

impl JsonReferenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ReferenceStore for JsonReferenceStore {
    async fn load_reference_population(&self) -> Result<Vec<ReferenceIdentity>, StoreError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let population: Vec<ReferenceIdentity> = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            identities = population.len(),
            "reference population loaded"
        );
        Ok(population)
    }
}

/// Attendance rows held in memory for the process lifetime.
pub struct MemoryAttendanceStore {
    rows: Mutex<Vec<AttendanceRow>>,
    timings: OfficeTimings,
}

impl MemoryAttendanceStore {
    pub fn new(timings: OfficeTimings) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            timings,
        }
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn today_record(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRow>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| row.user_id == user_id && row.entry_time.date_naive() == day)
            .cloned())
    }

    async fn insert_entry(
        &self,
        user_id: &str,
        similarity: f32,
        timestamp: DateTime<Utc>,
        is_late: bool,
    ) -> Result<AttendanceRow, StoreError> {
        let row = AttendanceRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            entry_time: timestamp,
            exit_time: None,
            similarity,
            is_late,
            is_early_exit: false,
        };
        self.rows.lock().await.push(row.clone());
        Ok(row)
    }

    async fn mark_exit(
        &self,
        row_id: Uuid,
        exit_time: DateTime<Utc>,
        is_early_exit: bool,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == row_id)
            .ok_or_else(|| StoreError(format!("attendance row {row_id} not found")))?;
        row.exit_time = Some(exit_time);
        row.is_early_exit = is_early_exit;
        Ok(())
    }

    async fn office_timings(&self) -> Result<OfficeTimings, StoreError> {
        Ok(self.timings)
    }
}
