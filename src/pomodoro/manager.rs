//! Timer state machine
//!
//! `TimerManager` owns the single live `TimerSnapshot`. Every mutation goes
//! through it and is followed by a whole-snapshot save, so the store always
//! holds what a fresh process needs to pick up where this one left off.
//! Remaining time is never counted down; it is re-derived from the session's
//! timestamps whenever it is asked for.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::OvertimePolicy;

use super::clock::Clock;
use super::history::{SessionHistory, TaskProgress};
use super::snapshot::{OvertimeAutoPaused, TimerSnapshot};
use super::store::SnapshotStore;
use super::time::{format_time_left, sanitize_paused_seconds};
use super::{Session, SessionId, SessionType, TaskId};

/// Derived state, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerPhase {
    /// No session and nothing waiting
    Idle,
    Running,
    Paused,
    /// Work session ran past its length and keeps running until the user acts
    WorkOverdue,
    /// Break ran past its length
    BreakOverdue,
    /// A session finished and the next one has not been started
    AwaitingNext,
}

impl TimerPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
            TimerPhase::WorkOverdue => "work overdue",
            TimerPhase::BreakOverdue => "break overdue",
            TimerPhase::AwaitingNext => "awaiting next session",
        }
    }
}

/// What happened to the stored snapshot when the manager loaded it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing was stored
    Fresh,
    /// Stored state had no live session
    Idle,
    /// A running session was picked up with its time re-derived
    Resumed,
    /// A paused session was picked up, still frozen
    Paused,
    /// The session's task was completed elsewhere, so the session was dropped
    DiscardedCompletedTask,
    /// The session had been left running far past its length and was stopped
    ExpiredStale,
    /// The stored state could not be decoded and was reset
    Corrupt,
    /// The store could not be read; it was left untouched
    Unreadable,
}

impl RestoreOutcome {
    /// Note worth showing the user, if any
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            RestoreOutcome::DiscardedCompletedTask => {
                Some("The previous session's task is already completed; session discarded.")
            }
            RestoreOutcome::ExpiredStale => {
                Some("The previous session was left running too long and has been stopped.")
            }
            RestoreOutcome::Corrupt => {
                Some("Saved timer state was unreadable and has been reset.")
            }
            RestoreOutcome::Unreadable => {
                Some("Saved timer state could not be read; see the log for details.")
            }
            _ => None,
        }
    }
}

/// Something the presentation layer may want to announce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Remaining time reached zero
    Finished { session_type: SessionType },
    /// A finished session was followed straight into the next one
    AutoAdvanced { next: SessionType },
    /// Another reminder interval of overtime went by
    OvertimeReminder {
        session_type: SessionType,
        overtime_seconds: i64,
    },
    /// The session was paused after running too far over
    AutoPaused {
        session_type: SessionType,
        overtime_seconds: i64,
    },
}

/// Result of one display refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub time_left: Option<i64>,
    pub events: Vec<TimerEvent>,
}

/// Read-only view of the timer for display and `--json` output
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStatus {
    pub phase: TimerPhase,
    pub session_type: SessionType,
    pub is_running: bool,
    pub time_left: Option<i64>,
    pub display: Option<String>,
    pub session_id: Option<SessionId>,
    pub task_id: Option<TaskId>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
    pub total_paused_seconds: f64,
    pub just_completed: bool,
    pub overtime_auto_paused: Option<OvertimeAutoPaused>,
}

/// Owns the timer state and every transition on it
pub struct TimerManager<C, S, H> {
    clock: C,
    store: S,
    history: H,
    policy: OvertimePolicy,
    state: TimerSnapshot,
    /// Remaining time seen at the previous tick, to spot the crossing into overtime
    last_time_left: Option<(SessionId, i64)>,
    /// Overtime interval the last reminder was sent for
    last_reminder: Option<(SessionId, u64)>,
    restore_outcome: RestoreOutcome,
}

impl<C: Clock, S: SnapshotStore, H: SessionHistory> TimerManager<C, S, H> {
    /// Create an idle manager without reading the store
    pub fn new(clock: C, store: S, history: H, policy: OvertimePolicy) -> Self {
        Self {
            clock,
            store,
            history,
            policy,
            state: TimerSnapshot::idle(),
            last_time_left: None,
            last_reminder: None,
            restore_outcome: RestoreOutcome::Fresh,
        }
    }

    /// Create a manager from whatever the store holds, re-derived against the clock
    pub fn restore(clock: C, store: S, history: H, policy: OvertimePolicy) -> Self {
        let mut manager = Self::new(clock, store, history, policy);
        manager.reload();
        manager
    }

    /// Re-read the store, replacing the in-memory state
    pub fn reload(&mut self) -> RestoreOutcome {
        let outcome = self.rehydrate();
        if outcome != RestoreOutcome::Fresh && outcome != RestoreOutcome::Idle {
            tracing::debug!("Timer state restored: {:?}", outcome);
        }
        self.restore_outcome = outcome;
        outcome
    }

    fn rehydrate(&mut self) -> RestoreOutcome {
        let now = self.clock.now();
        let loaded = match self.store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.state = TimerSnapshot::idle();
                return RestoreOutcome::Fresh;
            }
            Err(e) if e.is_corrupt() => {
                tracing::error!("{}", e.describe("Could not restore timer state"));
                self.state = TimerSnapshot::idle();
                if let Err(e) = self.store.clear() {
                    tracing::warn!("{}", e.describe("Failed to clear timer state"));
                }
                return RestoreOutcome::Corrupt;
            }
            Err(e) => {
                // The file may still hold a live session; leave it for the next run
                tracing::error!("{}", e.describe("Could not read timer state"));
                self.state = TimerSnapshot::idle();
                return RestoreOutcome::Unreadable;
            }
        };

        let missing_pause_instant = loaded.is_paused()
            && loaded
                .current_session
                .as_ref()
                .is_some_and(|s| s.paused_at.is_none());
        self.state = loaded.rehydrated(now);

        let Some(session) = self.state.current_session.clone() else {
            return RestoreOutcome::Idle;
        };

        if now < session.started_at {
            tracing::warn!(
                "Clock is behind the start of session {} ({} < {}); remaining time will look too long",
                session.id,
                now,
                session.started_at
            );
        }

        if self.progress_of(session.task_id).is_some_and(|p| p.task_completed) {
            tracing::info!(
                "Discarding session {}: its task is already completed",
                session.id
            );
            self.state = TimerSnapshot::idle();
            self.persist();
            return RestoreOutcome::DiscardedCompletedTask;
        }

        if self.state.is_running && self.is_stale(&session, now) {
            tracing::info!(
                "Stopping session {}: left running {}s past its length",
                session.id,
                -session.time_left(now, true)
            );
            self.finish_session(false);
            self.state = TimerSnapshot::idle();
            self.persist();
            return RestoreOutcome::ExpiredStale;
        }

        if missing_pause_instant {
            self.persist();
        }

        if self.state.is_running {
            RestoreOutcome::Resumed
        } else {
            RestoreOutcome::Paused
        }
    }

    fn is_stale(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let factor = self.policy.stale_session_factor;
        if !(factor.is_finite() && factor > 0.0) {
            return false;
        }
        let overtime = -session.time_left(now, true);
        overtime > 0 && overtime as f64 > factor * session.duration_seconds() as f64
    }

    // ---- Transitions ----

    /// Start a session; ignored while another one is active or for a non-positive duration
    pub fn start(
        &mut self,
        task_id: Option<TaskId>,
        session_type: SessionType,
        duration_minutes: f64,
    ) -> bool {
        if let Some(current) = &self.state.current_session {
            tracing::debug!("start ignored: session {} is still active", current.id);
            return false;
        }
        if !(duration_minutes.is_finite() && duration_minutes > 0.0) {
            tracing::debug!("start ignored: invalid duration {}", duration_minutes);
            return false;
        }

        let session = Session::begin(task_id, session_type, duration_minutes, self.clock.now());
        tracing::info!(
            "Started {} session {} ({} min)",
            session_type.label(),
            session.id,
            duration_minutes
        );
        self.last_time_left = Some((session.id, session.duration_seconds()));
        self.state = TimerSnapshot {
            is_running: true,
            time_left_seconds: session.duration_seconds(),
            session_type,
            just_completed: false,
            current_task_id: task_id,
            overtime_auto_paused: None,
            current_session: Some(session),
        };
        self.persist();
        true
    }

    /// Start a work session of the configured length
    pub fn start_pomodoro(&mut self, task_id: Option<TaskId>) -> bool {
        let minutes = self.history.settings().work_duration;
        self.start(task_id, SessionType::Work, minutes)
    }

    pub fn pause(&mut self) -> bool {
        if !self.state.is_running {
            tracing::debug!("pause ignored: timer is not running");
            return false;
        }
        let now = self.clock.now();
        let Some(session) = self.state.current_session.as_mut() else {
            return false;
        };
        session.paused_at = Some(now);
        self.state.is_running = false;
        tracing::info!("Paused session {}", session.id);
        self.persist();
        true
    }

    /// Resume a paused session; the pause window is added to the paused total
    pub fn resume(&mut self) -> bool {
        if !self.state.is_paused() {
            tracing::debug!("resume ignored: timer is not paused");
            return false;
        }
        let now = self.clock.now();
        let Some(session) = self.state.current_session.as_mut() else {
            return false;
        };
        if let Some(paused_at) = session.paused_at.take() {
            // Clamped so a clock that jumped back cannot shrink the paused total
            let delta = ((now - paused_at).num_milliseconds() as f64 / 1000.0)
                .ceil()
                .max(0.0);
            session.total_paused_seconds =
                sanitize_paused_seconds(session.total_paused_seconds) + delta;
        }
        self.last_time_left = Some((session.id, session.time_left(now, true)));
        tracing::info!("Resumed session {}", session.id);
        self.state.is_running = true;
        self.state.overtime_auto_paused = None;
        self.persist();
        true
    }

    /// Abandon the current session; it is logged as incomplete and earns no task credit
    pub fn stop(&mut self) -> bool {
        if self.state.current_session.is_none() {
            tracing::debug!("stop ignored: no active session");
            return false;
        }
        if let Some(session) = self.finish_session(false) {
            tracing::info!("Stopped session {}", session.id);
        }
        self.state = TimerSnapshot::idle();
        self.persist();
        true
    }

    /// Natural completion: record the session, then follow the auto-start
    /// settings or wait for the user
    pub fn complete(&mut self) -> bool {
        let overdue = self.time_left().is_some_and(|left| left < 0);
        self.finish_and_advance(!overdue)
    }

    fn finish_and_advance(&mut self, allow_auto_start: bool) -> bool {
        let Some(session) = self.finish_session(true) else {
            tracing::debug!("complete ignored: no active session");
            return false;
        };
        let progress = self.progress_of(session.task_id);

        if progress.is_some_and(|p| p.reached_estimate()) {
            self.await_next(&session);
            return true;
        }

        let settings = self.history.settings();
        let auto_start = if session.session_type.is_break() {
            settings.auto_start_pomodoros
        } else {
            settings.auto_start_breaks
        };
        if auto_start && allow_auto_start {
            self.state = TimerSnapshot::idle();
            if self.start_following(session.task_id, session.session_type, progress) {
                return true;
            }
        }

        self.await_next(&session);
        true
    }

    /// Finish the current work session; from overtime this goes straight into the break
    pub fn complete_work_session(&mut self) -> bool {
        let is_work = self
            .state
            .current_session
            .as_ref()
            .is_some_and(|s| s.session_type == SessionType::Work);
        if !is_work {
            tracing::debug!("complete_work_session ignored: no active work session");
            return false;
        }
        if !self.is_work_overdue() {
            return self.complete();
        }

        let Some(session) = self.finish_session(true) else {
            return false;
        };
        let progress = self.progress_of(session.task_id);
        self.state = TimerSnapshot::idle();
        if !self.start_following(session.task_id, SessionType::Work, progress) {
            self.await_next(&session);
        }
        true
    }

    /// End the current break early and go back to work unless the task is done
    pub fn skip_break(&mut self) -> bool {
        let is_break = self
            .state
            .current_session
            .as_ref()
            .is_some_and(|s| s.session_type.is_break());
        if !is_break {
            tracing::debug!("skip_break ignored: no active break");
            return false;
        }
        let Some(session) = self.finish_session(true) else {
            return false;
        };
        let progress = self.progress_of(session.task_id);
        if progress.is_some_and(|p| p.reached_estimate() || p.task_completed) {
            self.await_next(&session);
            return true;
        }

        let minutes = self.history.settings().work_duration;
        self.state = TimerSnapshot::idle();
        if !self.start(session.task_id, SessionType::Work, minutes) {
            self.await_next(&session);
        }
        true
    }

    /// Move on from the current or just-finished session to whatever comes next
    ///
    /// A live session is recorded as completed first. After work a break
    /// follows while the task still has estimated sessions left (or has just
    /// hit its estimate); after a break, work follows. Otherwise the timer
    /// goes idle.
    pub fn start_next_session(&mut self) -> bool {
        let previous = if self.state.current_session.is_some() {
            self.finish_session(true)
                .map(|s| (s.task_id, s.session_type))
        } else if self.state.just_completed {
            Some((self.state.current_task_id, self.state.session_type))
        } else {
            None
        };
        let Some((task_id, finished)) = previous else {
            tracing::debug!("start_next_session ignored: nothing to continue from");
            return false;
        };

        let progress = self.progress_of(task_id);
        let keep_going = match progress {
            None => true,
            Some(p) if p.task_completed => false,
            Some(p) => {
                p.completed_work_sessions < p.estimated_pomodoros
                    || (finished == SessionType::Work
                        && p.completed_work_sessions == p.estimated_pomodoros)
            }
        };

        self.state = TimerSnapshot::idle();
        if keep_going && self.start_following(task_id, finished, progress) {
            return true;
        }
        tracing::info!("No further session to start; timer is idle");
        self.persist();
        true
    }

    /// Start whatever follows `finished`: a break after work, work after a break
    fn start_following(
        &mut self,
        task_id: Option<TaskId>,
        finished: SessionType,
        progress: Option<TaskProgress>,
    ) -> bool {
        let settings = self.history.settings();
        let next = if finished.is_break() {
            SessionType::Work
        } else {
            settings.break_after(progress.map(|p| p.completed_work_sessions).unwrap_or(0))
        };
        self.start(task_id, next, settings.duration_for(next))
    }

    /// Idle, remembering what just finished so the next step can be chosen later
    fn await_next(&mut self, finished: &Session) {
        self.state = TimerSnapshot {
            session_type: finished.session_type,
            just_completed: true,
            current_task_id: finished.task_id,
            ..TimerSnapshot::idle()
        };
        self.persist();
    }

    /// Take the live session out of the state, close it and append it to history
    fn finish_session(&mut self, completed: bool) -> Option<Session> {
        let mut session = self.state.current_session.take()?;
        session.finalize(completed, self.clock.now());
        self.state.is_running = false;
        if let Err(e) = self.history.record(session.to_record()) {
            tracing::error!("{}", e.describe("Failed to record session"));
        }
        if completed {
            tracing::info!(
                "Completed {} session {}",
                session.session_type.label(),
                session.id
            );
        }
        self.last_time_left = None;
        self.last_reminder = None;
        Some(session)
    }

    // ---- Refresh ----

    /// Re-derive remaining time and report anything worth announcing
    ///
    /// Safe to call at any rate: a late, skipped or doubled tick changes
    /// nothing but the cached value.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let Some(session) = self.state.current_session.clone() else {
            return TickReport::default();
        };
        let time_left = session.time_left(now, self.state.is_running);
        self.state.time_left_seconds = time_left;

        let mut report = TickReport {
            time_left: Some(time_left),
            events: Vec::new(),
        };
        if !self.state.is_running {
            return report;
        }

        let previous = self
            .last_time_left
            .filter(|(id, _)| *id == session.id)
            .map(|(_, left)| left);
        self.last_time_left = Some((session.id, time_left));

        if previous.is_some_and(|left| left > 0) && time_left <= 0 {
            report.events.push(TimerEvent::Finished {
                session_type: session.session_type,
            });
            let settings = self.history.settings();
            let auto_start = if session.session_type.is_break() {
                settings.auto_start_pomodoros
            } else {
                settings.auto_start_breaks
            };
            if auto_start {
                // Crossing zero is the natural end even if this tick landed past it
                self.finish_and_advance(true);
                if let Some(next) = self.state.current_session.as_ref() {
                    report.events.push(TimerEvent::AutoAdvanced {
                        next: next.session_type,
                    });
                }
                report.time_left = self.time_left();
                return report;
            }
        }

        if time_left < 0 {
            let overtime = -time_left;
            let auto_pause = self.policy.auto_pause_after_secs;
            if auto_pause > 0 && overtime as u64 >= auto_pause {
                self.auto_pause(&session, overtime, now);
                report.events.push(TimerEvent::AutoPaused {
                    session_type: session.session_type,
                    overtime_seconds: overtime,
                });
                return report;
            }

            let interval = self.policy.reminder_interval_minutes * 60;
            if interval > 0 {
                let bucket = overtime as u64 / interval;
                let reminded = self
                    .last_reminder
                    .filter(|(id, _)| *id == session.id)
                    .map(|(_, b)| b)
                    .unwrap_or(0);
                if bucket >= 1 && bucket > reminded {
                    self.last_reminder = Some((session.id, bucket));
                    report.events.push(TimerEvent::OvertimeReminder {
                        session_type: session.session_type,
                        overtime_seconds: overtime,
                    });
                }
            }
        } else if self.state.overtime_auto_paused.is_some() {
            self.state.overtime_auto_paused = None;
            self.persist();
        }

        report
    }

    fn auto_pause(&mut self, session: &Session, overtime: i64, now: DateTime<Utc>) {
        tracing::info!(
            "Auto-pausing session {} after {}s of overtime",
            session.id,
            overtime
        );
        if let Some(live) = self.state.current_session.as_mut() {
            live.paused_at = Some(now);
        }
        self.state.is_running = false;
        self.state.overtime_auto_paused = Some(OvertimeAutoPaused {
            session_type: session.session_type,
            triggered_at: now,
            overtime_seconds: overtime,
        });
        self.persist();
    }

    // ---- Queries ----

    /// Remaining seconds right now, `None` without a session
    pub fn time_left(&self) -> Option<i64> {
        let now = self.clock.now();
        self.state
            .current_session
            .as_ref()
            .map(|s| s.time_left(now, self.state.is_running))
    }

    pub fn phase(&self) -> TimerPhase {
        let Some(session) = self.state.current_session.as_ref() else {
            return if self.state.just_completed {
                TimerPhase::AwaitingNext
            } else {
                TimerPhase::Idle
            };
        };
        if !self.state.is_running {
            return TimerPhase::Paused;
        }
        match self.time_left() {
            Some(left) if left < 0 && session.session_type.is_break() => TimerPhase::BreakOverdue,
            Some(left) if left < 0 => TimerPhase::WorkOverdue,
            _ => TimerPhase::Running,
        }
    }

    /// A work session is past its length, running or not
    pub fn is_work_overdue(&self) -> bool {
        self.is_overdue(|t| t == SessionType::Work)
    }

    /// A break is past its length, running or not
    pub fn is_break_overdue(&self) -> bool {
        self.is_overdue(|t| t.is_break())
    }

    fn is_overdue(&self, matches: impl Fn(SessionType) -> bool) -> bool {
        self.state
            .current_session
            .as_ref()
            .is_some_and(|s| matches(s.session_type))
            && self.time_left().is_some_and(|left| left < 0)
    }

    pub fn status(&self) -> TimerStatus {
        let session = self.state.current_session.as_ref();
        let time_left = self.time_left();
        TimerStatus {
            phase: self.phase(),
            session_type: self.state.session_type,
            is_running: self.state.is_running,
            time_left,
            display: time_left.map(format_time_left),
            session_id: session.map(|s| s.id),
            task_id: self.state.current_task_id,
            started_at: session.map(|s| s.started_at),
            duration_minutes: session.map(|s| s.duration_minutes),
            total_paused_seconds: session.map(|s| s.total_paused_seconds).unwrap_or(0.0),
            just_completed: self.state.just_completed,
            overtime_auto_paused: self.state.overtime_auto_paused,
        }
    }

    pub fn snapshot(&self) -> &TimerSnapshot {
        &self.state
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }

    pub fn restore_outcome(&self) -> RestoreOutcome {
        self.restore_outcome
    }

    pub fn policy(&self) -> &OvertimePolicy {
        &self.policy
    }

    fn progress_of(&self, task_id: Option<TaskId>) -> Option<TaskProgress> {
        task_id.and_then(|id| self.history.task_progress(id))
    }

    /// Save the state, or clear the store when there is nothing worth keeping.
    /// Failures are logged; the in-memory state stays authoritative.
    fn persist(&mut self) {
        if let Some(left) = self.time_left() {
            self.state.time_left_seconds = left;
        } else {
            self.state.time_left_seconds = 0;
        }

        let result = if self.state.current_session.is_some() || self.state.just_completed {
            self.store.save(&self.state)
        } else {
            self.store.clear()
        };
        if let Err(e) = result {
            tracing::error!("{}", e.describe("Failed to save timer state"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::pomodoro::history::{Task, UserData};
    use crate::pomodoro::store::MemorySnapshotStore;
    use crate::pomodoro::time::compute_time_left;
    use crate::pomodoro::ManualClock;
    use chrono::{Duration, TimeZone};

    type TestManager<'a> = TimerManager<ManualClock, &'a MemorySnapshotStore, UserData>;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    fn manager(store: &MemorySnapshotStore, data: UserData) -> (ManualClock, TestManager<'_>) {
        let clock = ManualClock::new(t0());
        let manager = TimerManager::new(clock.clone(), store, data, OvertimePolicy::default());
        (clock, manager)
    }

    fn data_with_task(estimate: u32) -> (UserData, TaskId) {
        let mut data = UserData::default();
        let id = data.add_task(Task::new("Write report", Some(estimate)));
        (data, id)
    }

    fn current_type(m: &TestManager<'_>) -> Option<SessionType> {
        m.snapshot().current_session.as_ref().map(|s| s.session_type)
    }

    #[test]
    fn test_start_creates_running_session() {
        let store = MemorySnapshotStore::new();
        let (_clock, mut m) = manager(&store, UserData::default());

        assert!(m.start(None, SessionType::Work, 25.0));
        assert_eq!(m.phase(), TimerPhase::Running);
        assert_eq!(m.time_left(), Some(1500));

        let session = m.snapshot().current_session.clone().unwrap();
        assert_eq!(session.started_at, t0());
        assert_eq!(session.total_paused_seconds, 0.0);
        assert!(session.paused_at.is_none());
        assert!(!session.completed);
        assert!(store.content().is_some());
    }

    #[test]
    fn test_start_while_active_is_ignored() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());

        assert!(m.start(None, SessionType::Work, 25.0));
        let original = m.snapshot().current_session.clone().unwrap();
        clock.advance_secs(60);

        assert!(!m.start(None, SessionType::ShortBreak, 5.0));
        assert_eq!(m.snapshot().current_session.as_ref(), Some(&original));

        // Paused still counts as active
        m.pause();
        assert!(!m.start(None, SessionType::Work, 25.0));
        assert_eq!(m.snapshot().current_session.as_ref().unwrap().id, original.id);
    }

    #[test]
    fn test_start_rejects_bad_duration() {
        let store = MemorySnapshotStore::new();
        let (_clock, mut m) = manager(&store, UserData::default());
        assert!(!m.start(None, SessionType::Work, 0.0));
        assert!(!m.start(None, SessionType::Work, f64::NAN));
        assert_eq!(m.phase(), TimerPhase::Idle);
    }

    #[test]
    fn test_start_pomodoro_uses_settings() {
        let store = MemorySnapshotStore::new();
        let mut data = UserData::default();
        data.settings.work_duration = 50.0;
        let (_clock, mut m) = manager(&store, data);
        assert!(m.start_pomodoro(None));
        assert_eq!(m.time_left(), Some(3000));
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());

        m.start(None, SessionType::Work, 25.0);
        clock.advance_secs(300);
        assert!(m.pause());
        assert_eq!(m.time_left(), Some(1200));

        // Frozen however long the pause lasts
        clock.advance_secs(300);
        assert_eq!(m.time_left(), Some(1200));
        assert!(m.resume());
        assert_eq!(
            m.snapshot().current_session.as_ref().unwrap().total_paused_seconds,
            300.0
        );

        clock.advance_secs(300);
        // 900s elapsed, 300s of it paused
        assert_eq!(m.time_left(), Some(900));
    }

    #[test]
    fn test_resume_rounds_pause_up_to_whole_seconds() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        m.pause();
        clock.advance_millis(2_300);
        m.resume();
        assert_eq!(
            m.snapshot().current_session.as_ref().unwrap().total_paused_seconds,
            3.0
        );
    }

    #[test]
    fn test_resume_after_clock_jump_back_keeps_total() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        clock.advance_secs(100);
        m.pause();
        clock.advance_secs(-50);
        m.resume();
        assert_eq!(
            m.snapshot().current_session.as_ref().unwrap().total_paused_seconds,
            0.0
        );
    }

    #[test]
    fn test_invalid_transitions_are_no_ops() {
        let store = MemorySnapshotStore::new();
        let (_clock, mut m) = manager(&store, UserData::default());

        assert!(!m.pause());
        assert!(!m.resume());
        assert!(!m.stop());
        assert!(!m.complete());
        assert!(!m.skip_break());
        assert!(!m.complete_work_session());
        assert!(!m.start_next_session());
        assert_eq!(m.phase(), TimerPhase::Idle);

        m.start(None, SessionType::Work, 25.0);
        assert!(!m.resume());
        assert!(!m.skip_break());
        assert!(m.pause());
        assert!(!m.pause());
    }

    #[test]
    fn test_stop_records_incomplete_without_credit() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(3);
        let (clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::Work, 25.0);
        clock.advance_secs(600);
        assert!(m.stop());

        assert_eq!(m.phase(), TimerPhase::Idle);
        assert!(store.content().is_none());
        let log = &m.history().pomodoro_sessions;
        assert_eq!(log.len(), 1);
        assert!(!log[0].completed);
        assert_eq!(log[0].ended, Some(t0() + Duration::seconds(600)));
        assert_eq!(m.history().task_progress(task_id).unwrap().completed_work_sessions, 0);
    }

    #[test]
    fn test_stop_clears_auto_pause_marker() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 1.0);
        clock.advance_secs(60 + 900);
        m.tick();
        assert!(m.snapshot().overtime_auto_paused.is_some());
        m.stop();
        assert!(m.snapshot().overtime_auto_paused.is_none());
    }

    #[test]
    fn test_overdue_work_scenario() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(4);
        let (clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::Work, 25.0);
        clock.advance_secs(1500);
        assert_eq!(m.time_left(), Some(0));
        assert!(!m.is_work_overdue());

        clock.advance_secs(1);
        assert_eq!(m.time_left(), Some(-1));
        assert!(m.is_work_overdue());
        assert_eq!(m.phase(), TimerPhase::WorkOverdue);

        assert!(m.complete_work_session());
        let record = &m.history().pomodoro_sessions[0];
        assert!(record.completed);
        assert_eq!(record.ended, Some(t0() + Duration::seconds(1501)));
        assert_eq!(m.history().task_progress(task_id).unwrap().completed_work_sessions, 1);

        assert_eq!(current_type(&m), Some(SessionType::ShortBreak));
        assert_eq!(m.time_left(), Some(300));
        assert_eq!(m.phase(), TimerPhase::Running);
    }

    #[test]
    fn test_overdue_work_past_estimate_still_starts_break() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(1);
        let (clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::Work, 25.0);
        m.complete();
        assert_eq!(m.phase(), TimerPhase::AwaitingNext);

        // Keep working past the estimate, then let it run over
        assert!(m.start(Some(task_id), SessionType::Work, 25.0));
        clock.advance_secs(1501);
        assert!(m.is_work_overdue());

        assert!(m.complete_work_session());
        assert_eq!(m.history().task_progress(task_id).unwrap().completed_work_sessions, 2);
        assert_eq!(current_type(&m), Some(SessionType::ShortBreak));
        assert_eq!(m.phase(), TimerPhase::Running);
        assert_eq!(m.snapshot().current_task_id, Some(task_id));
    }

    #[test]
    fn test_overdue_session_keeps_running_without_action() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::ShortBreak, 5.0);
        clock.advance_secs(400);
        m.tick();
        assert_eq!(m.phase(), TimerPhase::BreakOverdue);
        assert!(m.is_break_overdue());
        assert_eq!(current_type(&m), Some(SessionType::ShortBreak));
    }

    #[test]
    fn test_complete_waits_for_user_by_default() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(3);
        let (_clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::Work, 25.0);
        assert!(m.complete());
        assert_eq!(m.phase(), TimerPhase::AwaitingNext);
        assert!(m.snapshot().just_completed);
        assert_eq!(m.snapshot().session_type, SessionType::Work);
        assert_eq!(m.snapshot().current_task_id, Some(task_id));

        // Persisted so the next run can pick the next step
        let saved = store.load().unwrap().unwrap();
        assert!(saved.just_completed);

        assert!(m.start_next_session());
        assert_eq!(current_type(&m), Some(SessionType::ShortBreak));
    }

    #[test]
    fn test_complete_auto_starts_break() {
        let store = MemorySnapshotStore::new();
        let (mut data, task_id) = data_with_task(3);
        data.settings.auto_start_breaks = true;
        let (_clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::Work, 25.0);
        assert!(m.complete());
        assert_eq!(current_type(&m), Some(SessionType::ShortBreak));
        assert!(!m.snapshot().just_completed);
    }

    #[test]
    fn test_complete_stops_at_estimate() {
        let store = MemorySnapshotStore::new();
        let (mut data, task_id) = data_with_task(1);
        data.settings.auto_start_breaks = true;
        let (_clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::Work, 25.0);
        m.complete();
        assert_eq!(m.phase(), TimerPhase::AwaitingNext);

        // Having just hit the estimate still earns the break
        assert!(m.start_next_session());
        assert_eq!(current_type(&m), Some(SessionType::ShortBreak));

        // But after the break there is nothing left to do
        assert!(m.start_next_session());
        assert_eq!(m.phase(), TimerPhase::Idle);
    }

    #[test]
    fn test_long_break_every_fourth_session() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(8);
        let (_clock, mut m) = manager(&store, data);

        for round in 1..=4 {
            assert!(m.start(Some(task_id), SessionType::Work, 25.0));
            assert!(m.complete_work_session());
            assert!(m.start_next_session());
            let expected = if round == 4 {
                SessionType::LongBreak
            } else {
                SessionType::ShortBreak
            };
            assert_eq!(current_type(&m), Some(expected), "round {}", round);
            m.stop();
        }
        assert_eq!(m.history().settings().long_break_duration, 10.0);
    }

    #[test]
    fn test_skip_break_goes_back_to_work() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(3);
        let (clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::ShortBreak, 5.0);
        clock.advance_secs(120);
        assert!(m.skip_break());
        assert_eq!(current_type(&m), Some(SessionType::Work));
        assert_eq!(m.time_left(), Some(1800));
        assert!(m.history().pomodoro_sessions[0].completed);
    }

    #[test]
    fn test_skip_break_when_task_done_goes_idle() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(1);
        let (_clock, mut m) = manager(&store, data);

        m.start(Some(task_id), SessionType::Work, 25.0);
        m.complete_work_session();
        m.start_next_session();
        assert!(m.skip_break());
        assert_eq!(m.phase(), TimerPhase::AwaitingNext);
    }

    #[test]
    fn test_start_next_from_live_break_starts_work() {
        let store = MemorySnapshotStore::new();
        let (_clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::LongBreak, 10.0);
        assert!(m.start_next_session());
        assert_eq!(current_type(&m), Some(SessionType::Work));
    }

    #[test]
    fn test_tick_reports_finish_then_reminders_then_auto_pause() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 1.0);

        clock.advance_secs(30);
        assert!(m.tick().events.is_empty());

        clock.advance_secs(31);
        let report = m.tick();
        assert_eq!(report.time_left, Some(-1));
        assert_eq!(
            report.events,
            vec![TimerEvent::Finished {
                session_type: SessionType::Work
            }]
        );
        // No automatic switch without auto-start
        assert_eq!(current_type(&m), Some(SessionType::Work));

        clock.set(t0() + Duration::seconds(60 + 300));
        let report = m.tick();
        assert_eq!(
            report.events,
            vec![TimerEvent::OvertimeReminder {
                session_type: SessionType::Work,
                overtime_seconds: 300
            }]
        );

        // Only once per interval
        clock.advance_secs(30);
        assert!(m.tick().events.is_empty());

        clock.set(t0() + Duration::seconds(60 + 900));
        let report = m.tick();
        assert_eq!(
            report.events,
            vec![TimerEvent::AutoPaused {
                session_type: SessionType::Work,
                overtime_seconds: 900
            }]
        );
        assert_eq!(m.phase(), TimerPhase::Paused);
        let marker = m.snapshot().overtime_auto_paused.unwrap();
        assert_eq!(marker.overtime_seconds, 900);
        assert_eq!(marker.triggered_at, t0() + Duration::seconds(960));

        // Marker survives a reload, and resume clears it
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.overtime_auto_paused, Some(marker));
        clock.advance_secs(3600);
        assert_eq!(m.time_left(), Some(-900));
        assert!(m.resume());
        assert!(m.snapshot().overtime_auto_paused.is_none());
        assert_eq!(m.time_left(), Some(-900));
    }

    #[test]
    fn test_tick_auto_advances_with_auto_start() {
        let store = MemorySnapshotStore::new();
        let mut data = UserData::default();
        data.settings.auto_start_pomodoros = true;
        let (clock, mut m) = manager(&store, data);
        m.start(None, SessionType::ShortBreak, 5.0);

        clock.advance_secs(300);
        let report = m.tick();
        assert_eq!(
            report.events,
            vec![
                TimerEvent::Finished {
                    session_type: SessionType::ShortBreak
                },
                TimerEvent::AutoAdvanced {
                    next: SessionType::Work
                },
            ]
        );
        assert_eq!(report.time_left, Some(1800));
        assert!(m.history().pomodoro_sessions[0].completed);
    }

    #[test]
    fn test_tick_does_not_persist_plain_refresh() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        let before = store.content();
        clock.advance_secs(10);
        m.tick();
        m.tick();
        assert_eq!(store.content(), before);
    }

    #[test]
    fn test_reload_rederives_running_time() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        clock.advance_secs(300);
        m.pause();
        clock.advance_secs(300);
        m.resume();

        // Closed for a while
        clock.set(t0() + Duration::seconds(2000));
        let restored = TimerManager::restore(
            clock.clone(),
            &store,
            UserData::default(),
            OvertimePolicy::default(),
        );
        assert_eq!(restored.restore_outcome(), RestoreOutcome::Resumed);
        let expected = compute_time_left(t0(), 25.0, 300.0, clock.now(), true, None);
        assert_eq!(restored.time_left(), Some(expected));
        assert_eq!(restored.snapshot().time_left_seconds, expected);
        assert_eq!(expected, -200);
    }

    #[test]
    fn test_reload_keeps_paused_time_frozen() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        clock.advance_secs(600);
        m.pause();

        clock.advance(Duration::days(2));
        let restored = TimerManager::restore(
            clock.clone(),
            &store,
            UserData::default(),
            OvertimePolicy::default(),
        );
        assert_eq!(restored.restore_outcome(), RestoreOutcome::Paused);
        assert_eq!(restored.time_left(), Some(900));
    }

    #[test]
    fn test_restore_empty_and_corrupt() {
        let store = MemorySnapshotStore::new();
        let clock = ManualClock::new(t0());
        let m = TimerManager::restore(
            clock.clone(),
            &store,
            UserData::default(),
            OvertimePolicy::default(),
        );
        assert_eq!(m.restore_outcome(), RestoreOutcome::Fresh);

        let store = MemorySnapshotStore::with_content("{\"isRunning\": tr");
        let m = TimerManager::restore(clock, &store, UserData::default(), OvertimePolicy::default());
        assert_eq!(m.restore_outcome(), RestoreOutcome::Corrupt);
        assert_eq!(m.phase(), TimerPhase::Idle);
        assert!(store.content().is_none());
    }

    #[test]
    fn test_restore_sanitizes_paused_total() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        let mut json: serde_json::Value =
            serde_json::from_str(&store.content().unwrap()).unwrap();
        json["totalPausedTime"] = "not a number".into();
        let store = MemorySnapshotStore::with_content(json.to_string());

        clock.advance_secs(60);
        let restored =
            TimerManager::restore(clock, &store, UserData::default(), OvertimePolicy::default());
        assert_eq!(restored.time_left(), Some(1440));
    }

    #[test]
    fn test_restore_discards_session_of_completed_task() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(3);
        let (clock, mut m) = manager(&store, data.clone());
        m.start(Some(task_id), SessionType::Work, 25.0);

        let mut elsewhere = data;
        elsewhere.complete_task(task_id);
        let restored =
            TimerManager::restore(clock, &store, elsewhere, OvertimePolicy::default());
        assert_eq!(
            restored.restore_outcome(),
            RestoreOutcome::DiscardedCompletedTask
        );
        assert_eq!(restored.phase(), TimerPhase::Idle);
        assert!(store.content().is_none());
    }

    #[test]
    fn test_restore_expires_stale_session() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);

        // More than twice the duration past the end
        clock.advance_secs(1500 + 3001);
        let restored =
            TimerManager::restore(clock, &store, UserData::default(), OvertimePolicy::default());
        assert_eq!(restored.restore_outcome(), RestoreOutcome::ExpiredStale);
        assert_eq!(restored.phase(), TimerPhase::Idle);
        let log = &restored.history().pomodoro_sessions;
        assert_eq!(log.len(), 1);
        assert!(!log[0].completed);
    }

    #[test]
    fn test_restore_keeps_overtime_below_stale_limit() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        clock.advance_secs(1500 + 2000);
        let restored =
            TimerManager::restore(clock, &store, UserData::default(), OvertimePolicy::default());
        assert_eq!(restored.restore_outcome(), RestoreOutcome::Resumed);
        assert_eq!(restored.time_left(), Some(-2000));
    }

    #[test]
    fn test_restore_awaiting_next() {
        let store = MemorySnapshotStore::new();
        let (data, task_id) = data_with_task(3);
        let (clock, mut m) = manager(&store, data);
        m.start(Some(task_id), SessionType::Work, 25.0);
        m.complete();

        let mut restored =
            TimerManager::restore(clock, &store, m.history().clone(), OvertimePolicy::default());
        assert_eq!(restored.restore_outcome(), RestoreOutcome::Idle);
        assert_eq!(restored.phase(), TimerPhase::AwaitingNext);
        assert!(restored.start_next_session());
        assert_eq!(current_type(&restored), Some(SessionType::ShortBreak));
    }

    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn load(&self) -> StoreResult<Option<TimerSnapshot>> {
            Ok(None)
        }

        fn save(&self, _snapshot: &TimerSnapshot) -> StoreResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded").into())
        }

        fn clear(&self) -> StoreResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "storage disabled").into())
        }
    }

    #[test]
    fn test_storage_failure_keeps_memory_state() {
        let clock = ManualClock::new(t0());
        let mut m = TimerManager::new(
            clock.clone(),
            FailingStore,
            UserData::default(),
            OvertimePolicy::default(),
        );
        assert!(m.start(None, SessionType::Work, 25.0));
        clock.advance_secs(60);
        assert_eq!(m.time_left(), Some(1440));
        assert!(m.pause());
        assert!(m.stop());
        assert_eq!(m.phase(), TimerPhase::Idle);
    }

    /// Reads fail with a plain IO error; remembers whether it was cleared
    #[derive(Default)]
    struct UnreadableStore {
        cleared: std::cell::Cell<bool>,
    }

    impl SnapshotStore for UnreadableStore {
        fn load(&self) -> StoreResult<Option<TimerSnapshot>> {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied).into())
        }

        fn save(&self, _snapshot: &TimerSnapshot) -> StoreResult<()> {
            Ok(())
        }

        fn clear(&self) -> StoreResult<()> {
            self.cleared.set(true);
            Ok(())
        }
    }

    #[test]
    fn test_restore_read_failure_keeps_stored_state() {
        let store = UnreadableStore::default();
        let m = TimerManager::restore(
            ManualClock::new(t0()),
            &store,
            UserData::default(),
            OvertimePolicy::default(),
        );
        assert_eq!(m.restore_outcome(), RestoreOutcome::Unreadable);
        assert!(m.restore_outcome().notice().is_some());
        assert_eq!(m.phase(), TimerPhase::Idle);
        assert!(!store.cleared.get());
    }

    #[test]
    fn test_status_json() {
        let store = MemorySnapshotStore::new();
        let (clock, mut m) = manager(&store, UserData::default());
        m.start(None, SessionType::Work, 25.0);
        clock.advance_secs(65);

        let status = m.status();
        assert_eq!(status.display.as_deref(), Some("23:55"));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "running");
        assert_eq!(json["sessionType"], "work");
        assert_eq!(json["timeLeft"], 1435);
    }
}
