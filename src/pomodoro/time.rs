//! Wall-clock time arithmetic for pomodoro sessions
//!
//! Every value here is re-derived from absolute timestamps on each call, so
//! querying once a second (or once an hour) never accumulates drift.

use chrono::{DateTime, Utc};

/// Coerce an accumulated pause total into something safe to subtract.
///
/// Non-finite values (they show up after a lossy JSON round trip) and
/// negative values both collapse to zero.
pub fn sanitize_paused_seconds(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Seconds remaining in a session, negative once it runs into overtime.
///
/// While running, elapsed time is measured up to `now`. While paused it is
/// frozen at `paused_at`; a paused session without a pause instant falls back
/// to `now`.
///
/// Rounding: positive values round up while running (the display never shows
/// `00:00` early) and to nearest while paused; overtime always rounds down.
pub fn compute_time_left(
    started_at: DateTime<Utc>,
    duration_minutes: f64,
    total_paused_seconds: f64,
    now: DateTime<Utc>,
    is_running: bool,
    paused_at: Option<DateTime<Utc>>,
) -> i64 {
    let reference = match (is_running, paused_at) {
        (false, Some(paused_at)) => paused_at,
        _ => now,
    };

    let elapsed_seconds = (reference - started_at).num_milliseconds() as f64 / 1000.0;
    let adjusted_elapsed = elapsed_seconds - sanitize_paused_seconds(total_paused_seconds);
    let raw_time_left = duration_minutes * 60.0 - adjusted_elapsed;

    if raw_time_left > 0.0 {
        if is_running {
            raw_time_left.ceil() as i64
        } else {
            raw_time_left.round() as i64
        }
    } else if raw_time_left < 0.0 {
        raw_time_left.floor() as i64
    } else {
        // Exactly zero, or NaN from a nonsensical duration
        0
    }
}

/// Format remaining seconds as MM:SS, or +MM:SS for overtime
pub fn format_time_left(seconds: i64) -> String {
    let abs = seconds.unsigned_abs();
    let formatted = format!("{:02}:{:02}", abs / 60, abs % 60);
    if seconds < 0 {
        format!("+{}", formatted)
    } else {
        formatted
    }
}
