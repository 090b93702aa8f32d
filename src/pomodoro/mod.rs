//! Pomodoro sessions and the timer that drives them
//!
//! This module provides:
//! - Wall-clock time arithmetic (`time`)
//! - The timer state machine with reload recovery (`manager`)
//! - Snapshot encoding and persistence ports (`snapshot`, `store`, `history`)
//! - Statistics over the session history (`stats`)

pub mod clock;
pub mod history;
pub mod manager;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod time;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use history::{SessionHistory, Task, TaskProgress, TimerSettings, UserData, UserDataStore};
pub use manager::{RestoreOutcome, TickReport, TimerEvent, TimerManager, TimerPhase, TimerStatus};
pub use snapshot::{decode_snapshot, encode_snapshot, OvertimeAutoPaused, TimerSnapshot};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use time::{compute_time_left, format_time_left, sanitize_paused_seconds};

/// Unique identifier for a session
pub type SessionId = Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Kind of interval being timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    #[default]
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn is_break(&self) -> bool {
        matches!(self, SessionType::ShortBreak | SessionType::LongBreak)
    }

    /// Short label for status lines
    pub fn label(&self) -> &'static str {
        match self {
            SessionType::Work => "Focus",
            SessionType::ShortBreak => "Break",
            SessionType::LongBreak => "Long break",
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.is_break() {
            "☕"
        } else {
            "🍅"
        }
    }
}

/// Persisted form of a session, used for the history log and inside the timer snapshot
///
/// Dates are ISO-8601 strings on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
    /// Nominal length in minutes
    #[serde(rename = "duration", alias = "durationMinutes")]
    pub duration_minutes: f64,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "type", default)]
    pub session_type: SessionType,
}

/// One live work or break interval
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    /// Task the session counts toward; breaks may have none
    pub task_id: Option<TaskId>,
    pub session_type: SessionType,
    /// Fixed when the session starts
    pub duration_minutes: f64,
    pub started_at: DateTime<Utc>,
    /// Most recent pause, cleared on resume
    pub paused_at: Option<DateTime<Utc>>,
    /// Only ever grows, and only on resume
    pub total_paused_seconds: f64,
    pub completed: bool,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session that starts running at `now`
    pub fn begin(
        task_id: Option<TaskId>,
        session_type: SessionType,
        duration_minutes: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            session_type,
            duration_minutes,
            started_at: now,
            paused_at: None,
            total_paused_seconds: 0.0,
            completed: false,
            ended_at: None,
        }
    }

    /// Rebuild a live session from its persisted record plus the pause bookkeeping
    /// stored alongside it in the snapshot
    pub fn from_record(
        record: SessionRecord,
        paused_at: Option<DateTime<Utc>>,
        total_paused_seconds: f64,
    ) -> Self {
        Self {
            id: record.id,
            task_id: record.task_id,
            session_type: record.session_type,
            duration_minutes: record.duration_minutes,
            started_at: record.started,
            paused_at,
            total_paused_seconds: sanitize_paused_seconds(total_paused_seconds),
            completed: record.completed,
            ended_at: record.ended,
        }
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            task_id: self.task_id,
            started: self.started_at,
            ended: self.ended_at,
            duration_minutes: self.duration_minutes,
            completed: self.completed,
            session_type: self.session_type,
        }
    }

    /// Nominal length in whole seconds, rounded up
    pub fn duration_seconds(&self) -> i64 {
        (self.duration_minutes * 60.0).ceil() as i64
    }

    /// Remaining seconds at `now`; frozen at `paused_at` when not running
    pub fn time_left(&self, now: DateTime<Utc>, is_running: bool) -> i64 {
        compute_time_left(
            self.started_at,
            self.duration_minutes,
            self.total_paused_seconds,
            now,
            is_running,
            self.paused_at,
        )
    }

    /// Close the session; `completed` distinguishes finishing from abandoning
    pub fn finalize(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        self.ended_at = Some(now);
        self.paused_at = None;
    }
}
