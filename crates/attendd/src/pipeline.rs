//! Submission entry point and the matching job itself.
//!
//! `submit_image_for_matching` is the produced interface of the core: it
//! enforces the per-connection in-flight cap, registers the task in the
//! ledger, and hands the CPU-heavy work to the pool. Completion runs on the
//! pool thread and is unconditional — the ledger entry is removed and a
//! response queued whether the job succeeded, failed, or panicked.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use attend_core::find_matches;
use chrono::Utc;
use uuid::Uuid;

use crate::attendance::{process_attendance, EntryType};
use crate::context::AppContext;
use crate::error::{PipelineError, SubmitError};
use crate::relay::{ConnectionResponse, ResponseBody, TaskOutput};
use crate::{ConnectionId, TaskId};

/// Queue one image for matching on behalf of a connection.
///
/// Increments the connection's pending-task counter; rejects with
/// [`SubmitError::Busy`] once the cap is reached. Never blocks on pool
/// capacity.
pub fn submit_image_for_matching(
    ctx: &Arc<AppContext>,
    connection_id: ConnectionId,
    image_bytes: Vec<u8>,
    entry_type: EntryType,
) -> Result<TaskId, SubmitError> {
    if ctx.cpu_pool.is_stopped() {
        return Err(SubmitError::ShuttingDown);
    }

    let task_id = Uuid::new_v4();
    ctx.ledger
        .try_register(task_id, connection_id, ctx.max_pending_per_connection)
        .map_err(|pending| SubmitError::Busy {
            connection_id,
            pending,
        })?;

    tracing::debug!(%task_id, %connection_id, "matching task submitted");

    let ctx = Arc::clone(ctx);
    let pool = Arc::clone(&ctx.cpu_pool);
    pool.submit(move |rt| {
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_match_job(&ctx, rt, &image_bytes, entry_type)
        }))
        .unwrap_or(Err(PipelineError::TaskPanicked));
        complete_task(&ctx, task_id, result);
    });

    Ok(task_id)
}

/// The CPU-bound job body: decode, extract, match, apply attendance policy.
fn run_match_job(
    ctx: &AppContext,
    rt: &tokio::runtime::Handle,
    image_bytes: &[u8],
    entry_type: EntryType,
) -> Result<TaskOutput, PipelineError> {
    let image = image::load_from_memory(image_bytes)?;
    let faces = ctx
        .extractor
        .extract(&image)
        .map_err(PipelineError::Extraction)?;

    if faces.is_empty() {
        return Ok(TaskOutput {
            processed: Vec::new(),
            updates: Vec::new(),
            faces_detected: 0,
        });
    }

    let population = rt
        .block_on(ctx.cache.get_all())
        .map_err(PipelineError::ReferenceStore)?;
    let matches = find_matches(&faces, &population, ctx.similarity_threshold);
    tracing::debug!(
        faces = faces.len(),
        candidates = population.len(),
        matched = matches.len(),
        "matching complete"
    );

    let now = Utc::now();
    let mut processed = Vec::with_capacity(matches.len());
    let mut updates = Vec::new();
    for matched in &matches {
        let outcome = rt
            .block_on(process_attendance(
                ctx.attendance.as_ref(),
                &matched.identity,
                matched.similarity,
                entry_type,
                now,
            ))
            .map_err(PipelineError::AttendanceStore)?;
        processed.push(outcome.processed);
        if let Some(event) = outcome.event {
            updates.push(event);
        }
    }

    Ok(TaskOutput {
        processed,
        updates,
        faces_detected: faces.len(),
    })
}

/// Terminal accounting for one task. Runs exactly once per submission, on
/// the pool thread, regardless of how the job ended. A full response queue
/// blocks here — that stall is the backpressure that throttles completion
/// acceptance.
fn complete_task(ctx: &AppContext, task_id: TaskId, result: Result<TaskOutput, PipelineError>) {
    let Some(connection_id) = ctx.ledger.complete(task_id) else {
        tracing::warn!(%task_id, "completion for unknown task");
        return;
    };

    let body = match result {
        Ok(output) => ResponseBody::Output(output),
        Err(err) => {
            tracing::error!(%task_id, %connection_id, error = %err, "matching task failed");
            ResponseBody::Error(err.to_string())
        }
    };

    let Some(relay) = ctx.relay() else {
        tracing::warn!(%task_id, "pipeline stopped, dropping result");
        return;
    };
    if relay
        .responses
        .blocking_send(ConnectionResponse {
            connection_id,
            body,
        })
        .is_err()
    {
        tracing::warn!(%task_id, "response queue closed, dropping result");
    }
}
