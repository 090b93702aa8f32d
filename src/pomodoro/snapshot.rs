//! Durable timer snapshot and its JSON encoding
//!
//! `encode_snapshot` / `decode_snapshot` are the only place the typed timer
//! state meets its persisted JSON form. Decoding is lenient: missing fields
//! take defaults and a non-numeric paused total becomes zero, so a damaged
//! file degrades to a usable state instead of an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::time::sanitize_paused_seconds;
use super::{Session, SessionRecord, SessionType, TaskId};

/// Marker left when the timer paused itself after a long overrun
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeAutoPaused {
    pub session_type: SessionType,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub triggered_at: DateTime<Utc>,
    pub overtime_seconds: i64,
}

/// Timer state as owned by the manager and persisted on every transition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimerSnapshot {
    pub is_running: bool,
    /// Last computed remaining seconds; advisory only, recomputed after a reload
    pub time_left_seconds: i64,
    pub current_session: Option<Session>,
    /// Mirrors the current session's type, or the type that just finished
    pub session_type: SessionType,
    /// A session finished and the user has not picked the next step yet
    pub just_completed: bool,
    pub current_task_id: Option<TaskId>,
    pub overtime_auto_paused: Option<OvertimeAutoPaused>,
}

impl TimerSnapshot {
    /// Idle state, optionally remembering what just finished
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.current_session.is_some() && !self.is_running
    }

    /// Re-derive remaining time from wall-clock `now`, discarding the cached value.
    ///
    /// Running sessions are measured to `now`; paused ones stay anchored at
    /// their pause instant however long ago that was.
    pub fn rehydrated(mut self, now: DateTime<Utc>) -> Self {
        match self.current_session.as_mut() {
            Some(session) => {
                session.total_paused_seconds =
                    sanitize_paused_seconds(session.total_paused_seconds);
                if self.is_running {
                    session.paused_at = None;
                } else if session.paused_at.is_none() {
                    // Paused without a recorded instant: freeze from here on
                    session.paused_at = Some(now);
                }
                self.session_type = session.session_type;
                self.time_left_seconds = session.time_left(now, self.is_running);
                if self.current_task_id.is_none() {
                    self.current_task_id = session.task_id;
                }
            }
            None => {
                self.is_running = false;
                self.time_left_seconds = 0;
            }
        }
        self
    }
}

/// On-disk layout, camelCase to match the dashboard's stored state
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedTimerState {
    #[serde(default)]
    is_running: bool,
    #[serde(default, deserialize_with = "lenient_i64")]
    time_left: i64,
    #[serde(default)]
    current_session: Option<SessionRecord>,
    #[serde(default)]
    session_type: SessionType,
    #[serde(default)]
    just_completed: bool,
    #[serde(default)]
    current_task_id: Option<TaskId>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    paused_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    total_paused_time: f64,
    #[serde(default)]
    overtime_auto_paused: Option<OvertimeAutoPaused>,
}

/// Accept any JSON value, keeping it only if it is a usable number of seconds
fn lenient_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().map(sanitize_paused_seconds).unwrap_or(0.0))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v.round() as i64))
        .unwrap_or(0))
}

impl From<&TimerSnapshot> for PersistedTimerState {
    fn from(snapshot: &TimerSnapshot) -> Self {
        let session = snapshot.current_session.as_ref();
        Self {
            is_running: snapshot.is_running,
            time_left: snapshot.time_left_seconds,
            current_session: session.map(Session::to_record),
            session_type: snapshot.session_type,
            just_completed: snapshot.just_completed,
            current_task_id: snapshot.current_task_id,
            started_at: session.map(|s| s.started_at),
            paused_at: session.and_then(|s| s.paused_at),
            total_paused_time: session
                .map(|s| sanitize_paused_seconds(s.total_paused_seconds))
                .unwrap_or(0.0),
            overtime_auto_paused: snapshot.overtime_auto_paused,
        }
    }
}

impl From<PersistedTimerState> for TimerSnapshot {
    fn from(state: PersistedTimerState) -> Self {
        // startedAt is a denormalized copy of the session's own start date
        let current_session = state
            .current_session
            .map(|record| Session::from_record(record, state.paused_at, state.total_paused_time));

        let session_type = current_session
            .as_ref()
            .map(|s| s.session_type)
            .unwrap_or(state.session_type);

        Self {
            is_running: state.is_running && current_session.is_some(),
            time_left_seconds: state.time_left,
            session_type,
            just_completed: state.just_completed,
            current_task_id: state.current_task_id,
            overtime_auto_paused: state.overtime_auto_paused,
            current_session,
        }
    }
}

/// Serialize a snapshot to its persisted JSON form
pub fn encode_snapshot(snapshot: &TimerSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&PersistedTimerState::from(snapshot))
}

/// Parse persisted JSON back into a snapshot, sanitizing what it can
pub fn decode_snapshot(content: &str) -> Result<TimerSnapshot, serde_json::Error> {
    let state: PersistedTimerState = serde_json::from_str(content)?;
    Ok(state.into())
}
