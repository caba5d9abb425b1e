//! Attendance policy: what one matched identity does to today's record.
//!
//! Every matched identity yields a per-connection response entry; only the
//! outcomes that actually change state (a fresh entry, a recorded exit)
//! also yield a broadcast event.

use attend_core::messages::{AttendanceAction, AttendanceEvent, ProcessedUser};
use attend_core::ReferenceIdentity;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

use crate::error::StoreError;
use crate::traits::AttendanceStore;

/// Whether a submission marks arrival or departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryType {
    #[default]
    Entry,
    Exit,
}

/// Grace period after the office login time before an arrival counts late.
fn grace_period() -> Duration {
    Duration::hours(1)
}

pub struct AttendanceOutcome {
    pub processed: ProcessedUser,
    /// Present only when state changed.
    pub event: Option<AttendanceEvent>,
}

/// Apply the entry/exit policy for one matched identity at time `now`.
pub async fn process_attendance(
    store: &dyn AttendanceStore,
    identity: &ReferenceIdentity,
    similarity: f32,
    entry_type: EntryType,
    now: DateTime<Utc>,
) -> Result<AttendanceOutcome, StoreError> {
    let existing = store.today_record(&identity.id, now.date_naive()).await?;

    match entry_type {
        EntryType::Entry => match existing {
            Some(row) if row.exit_time.is_none() => Ok(AttendanceOutcome {
                processed: info_response(
                    identity,
                    similarity,
                    "Entry already marked for today",
                    Some(row.entry_time),
                    Some(row.entry_time),
                    None,
                ),
                event: None,
            }),
            Some(row) => Ok(AttendanceOutcome {
                // Exit already recorded; same-day reentry is not allowed.
                processed: info_response(
                    identity,
                    similarity,
                    "Cannot mark entry again for today after exit",
                    Some(row.entry_time),
                    Some(row.entry_time),
                    row.exit_time,
                ),
                event: None,
            }),
            None => mark_entry(store, identity, similarity, now).await,
        },
        EntryType::Exit => match existing {
            None => Ok(AttendanceOutcome {
                processed: info_response(
                    identity,
                    similarity,
                    "No entry record found for today",
                    None,
                    None,
                    None,
                ),
                event: None,
            }),
            Some(row) if row.exit_time.is_some() => Ok(AttendanceOutcome {
                processed: info_response(
                    identity,
                    similarity,
                    "Exit already marked for today",
                    row.exit_time,
                    Some(row.entry_time),
                    row.exit_time,
                ),
                event: None,
            }),
            Some(row) => mark_exit(store, identity, similarity, row, now).await,
        },
    }
}

async fn mark_entry(
    store: &dyn AttendanceStore,
    identity: &ReferenceIdentity,
    similarity: f32,
    now: DateTime<Utc>,
) -> Result<AttendanceOutcome, StoreError> {
    let timings = store.office_timings().await?;

    let mut is_late = false;
    let mut minutes_late = None;
    let mut late_message = None;
    let mut on_time_message = None;

    if let Some(login) = timings.login {
        let login_at = at_time_today(now, login);
        let grace_end = login_at + grace_period();
        if now > grace_end {
            is_late = true;
            let minutes = (now - login_at).num_minutes();
            minutes_late = Some(minutes);
            late_message = Some(format!(
                "Late arrival: {} ({} minutes late, Office time: {}, Grace period: {})",
                now.format("%H:%M"),
                minutes,
                login_at.format("%H:%M"),
                grace_end.format("%H:%M"),
            ));
        } else {
            on_time_message = Some(format!(
                "On time (Office time: {}, Grace period until: {})",
                login_at.format("%H:%M"),
                grace_end.format("%H:%M"),
            ));
        }
    }

    let row = store
        .insert_entry(&identity.id, similarity, now, is_late)
        .await?;
    tracing::info!(user = %identity.id, is_late, "attendance entry marked");

    let mut message = "Entry marked successfully".to_string();
    if let Some(detail) = late_message.as_deref().or(on_time_message.as_deref()) {
        message = format!("{message} - {detail}");
    }

    let event = AttendanceEvent {
        action: AttendanceAction::Entry,
        user_id: identity.id.clone(),
        name: identity.display_name.clone(),
        timestamp: row.entry_time,
        similarity,
        entry_time: Some(row.entry_time),
        exit_time: None,
        is_late: Some(is_late),
        late_message: late_message.clone(),
        minutes_late,
        is_early_exit: None,
        early_exit_message: None,
    };

    Ok(AttendanceOutcome {
        processed: ProcessedUser {
            user_id: identity.id.clone(),
            name: identity.display_name.clone(),
            message,
            similarity,
            timestamp: Some(row.entry_time),
            entry_time: Some(row.entry_time),
            exit_time: None,
        },
        event: Some(event),
    })
}

async fn mark_exit(
    store: &dyn AttendanceStore,
    identity: &ReferenceIdentity,
    similarity: f32,
    row: crate::traits::AttendanceRow,
    now: DateTime<Utc>,
) -> Result<AttendanceOutcome, StoreError> {
    let timings = store.office_timings().await?;

    let mut is_early_exit = false;
    let mut early_exit_message = None;
    if let Some(logout) = timings.logout {
        let logout_at = at_time_today(now, logout);
        if now < logout_at {
            is_early_exit = true;
            early_exit_message = Some(format!(
                "Early exit: {} (Office time: {})",
                now.format("%H:%M"),
                logout_at.format("%H:%M"),
            ));
        }
    }

    store.mark_exit(row.id, now, is_early_exit).await?;
    tracing::info!(user = %identity.id, is_early_exit, "attendance exit marked");

    let mut message = "Exit recorded successfully".to_string();
    if let Some(detail) = &early_exit_message {
        message = format!("{message} - {detail}");
    }

    let event = AttendanceEvent {
        action: AttendanceAction::Exit,
        user_id: identity.id.clone(),
        name: identity.display_name.clone(),
        timestamp: now,
        similarity,
        entry_time: Some(row.entry_time),
        exit_time: Some(now),
        is_late: None,
        late_message: None,
        minutes_late: None,
        is_early_exit: Some(is_early_exit),
        early_exit_message: early_exit_message.clone(),
    };

    Ok(AttendanceOutcome {
        processed: ProcessedUser {
            user_id: identity.id.clone(),
            name: identity.display_name.clone(),
            message,
            similarity,
            timestamp: Some(now),
            entry_time: Some(row.entry_time),
            exit_time: Some(now),
        },
        event: Some(event),
    })
}

fn info_response(
    identity: &ReferenceIdentity,
    similarity: f32,
    message: &str,
    timestamp: Option<DateTime<Utc>>,
    entry_time: Option<DateTime<Utc>>,
    exit_time: Option<DateTime<Utc>>,
) -> ProcessedUser {
    ProcessedUser {
        user_id: identity.id.clone(),
        name: identity.display_name.clone(),
        message: message.to_string(),
        similarity,
        timestamp,
        entry_time,
        exit_time,
    }
}

/// The given wall-clock time on `now`'s date, in UTC.
fn at_time_today(now: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    match Utc.from_local_datetime(&now.date_naive().and_time(time)) {
        chrono::LocalResult::Single(dt) => dt,
        // UTC has no DST folds; unreachable in practice, fall back to now.
        _ => now,
    }
}
