/// Time tracking over a task's `timeEntries`.
///
/// At most one entry per task is ongoing. Times are unix milliseconds.
use crate::payload::{TimeCategory, TimeEntry};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TrackingError {
    #[error("Time tracking already running")]
    AlreadyTracking,

    #[error("Time tracking is not running")]
    NotTracking,

    #[error("No time entry at index {0}")]
    EntryNotFound(usize),

    #[error("Time entry {0} is still running")]
    EntryOngoing(usize),
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open a new ongoing entry.
pub fn start(entries: &mut Vec<TimeEntry>, category: TimeCategory, now: i64) -> Result<(), TrackingError> {
    if entries.iter().any(|e| e.ongoing) {
        return Err(TrackingError::AlreadyTracking);
    }
    entries.push(TimeEntry {
        category,
        start_time: now,
        end_time: None,
        duration: None,
        ongoing: true,
        extra: Default::default(),
    });
    Ok(())
}

/// Close the ongoing entry. Returns its duration.
pub fn stop(entries: &mut [TimeEntry], now: i64) -> Result<i64, TrackingError> {
    let entry = entries
        .iter_mut()
        .rev()
        .find(|e| e.ongoing)
        .ok_or(TrackingError::NotTracking)?;
    let duration = (now - entry.start_time).max(0);
    entry.end_time = Some(now);
    entry.duration = Some(duration);
    entry.ongoing = false;
    Ok(duration)
}

/// Remove a finished entry.
pub fn delete_entry(entries: &mut Vec<TimeEntry>, index: usize) -> Result<TimeEntry, TrackingError> {
    match entries.get(index) {
        None => Err(TrackingError::EntryNotFound(index)),
        Some(e) if e.ongoing => Err(TrackingError::EntryOngoing(index)),
        Some(_) => Ok(entries.remove(index)),
    }
}

fn elapsed(entry: &TimeEntry, now: i64) -> i64 {
    if entry.ongoing {
        return (now - entry.start_time).max(0);
    }
    entry
        .duration
        .or_else(|| entry.end_time.map(|end| end - entry.start_time))
        .unwrap_or(0)
        .max(0)
}

/// Total tracked time, counting a running entry up to `now`.
pub fn total_tracked(entries: &[TimeEntry], now: i64) -> i64 {
    entries.iter().map(|e| elapsed(e, now)).sum()
}

/// Tracked time per category, in first-seen order.
pub fn totals_by_category(entries: &[TimeEntry], now: i64) -> Vec<(TimeCategory, i64)> {
    let mut totals: Vec<(TimeCategory, i64)> = Vec::new();
    for entry in entries {
        let spent = elapsed(entry, now);
        match totals.iter_mut().find(|(c, _)| *c == entry.category) {
            Some((_, total)) => *total += spent,
            None => totals.push((entry.category, spent)),
        }
    }
    totals
}

/// `0min`, `42min`, `3h 5min`. Seconds are dropped.
pub fn format_duration(ms: i64) -> String {
    if ms <= 0 {
        return "0min".to_string();
    }
    let minutes = ms / 1000 / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}h {}min", hours, minutes % 60)
    } else {
        format!("{}min", minutes)
    }
}
