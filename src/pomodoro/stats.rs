//! Statistics over the session history
//!
//! Only work sessions count. Completed ones add focus time; abandoned ones
//! only lower the completion rate.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use super::{SessionRecord, SessionType, TaskId};

/// Aggregated statistics for a task or a day
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedStats {
    /// Completed work sessions
    pub session_count: u32,
    /// Work sessions stopped before the end
    pub abandoned_count: u32,
    /// Nominal length of the completed sessions
    pub total_focus: Duration,
    /// Percentage of started work sessions that were completed
    pub completion_rate: f64,
}

impl AggregatedStats {
    /// Add a session to the aggregation; breaks are ignored
    pub fn add_session(&mut self, record: &SessionRecord) {
        if record.session_type != SessionType::Work {
            return;
        }
        if record.completed {
            self.session_count += 1;
            let secs = (record.duration_minutes * 60.0).max(0.0);
            if secs.is_finite() {
                self.total_focus += Duration::from_secs_f64(secs);
            }
        } else {
            self.abandoned_count += 1;
        }

        // Recalculate rate
        let started = self.session_count + self.abandoned_count;
        if started > 0 {
            self.completion_rate = self.session_count as f64 / started as f64 * 100.0;
        }
    }

    pub fn format_total_focus(&self) -> String {
        format_duration(self.total_focus)
    }

    pub fn format_completion_rate(&self) -> String {
        format!("{:.0}%", self.completion_rate)
    }
}

/// Aggregate sessions by task
pub fn aggregate_by_task(records: &[SessionRecord]) -> HashMap<TaskId, AggregatedStats> {
    let mut stats: HashMap<TaskId, AggregatedStats> = HashMap::new();

    for record in records {
        if let Some(task_id) = record.task_id {
            stats.entry(task_id).or_default().add_session(record);
        }
    }

    stats
}

/// Aggregate sessions by the calendar day they started on in `tz`
pub fn aggregate_by_day<Tz: TimeZone>(
    records: &[SessionRecord],
    tz: &Tz,
) -> BTreeMap<NaiveDate, AggregatedStats> {
    let mut stats: BTreeMap<NaiveDate, AggregatedStats> = BTreeMap::new();

    for record in records {
        let day = record.started.with_timezone(tz).date_naive();
        stats.entry(day).or_default().add_session(record);
    }

    stats.retain(|_, day| day.session_count + day.abandoned_count > 0);
    stats
}

/// Calculate overall statistics from all sessions
pub fn calculate_overall_stats(records: &[SessionRecord]) -> AggregatedStats {
    let mut stats = AggregatedStats::default();
    for record in records {
        stats.add_session(record);
    }
    stats
}

/// Sessions that started at or after `since`
pub fn records_since(records: &[SessionRecord], since: DateTime<Utc>) -> Vec<SessionRecord> {
    records
        .iter()
        .filter(|r| r.started >= since)
        .cloned()
        .collect()
}

/// Format a duration as MM:SS or HH:MM:SS
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}
