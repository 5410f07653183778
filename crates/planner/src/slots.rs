//! Candidate slot generation.
//!
//! Carves each work day in the horizon into free periods: the work window
//! minus fixed blocks, with lunch and periodic breaks injected. All math is
//! done in the user's timezone and emitted as UTC instants.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use dl_domain::model::Preferences;

/// A free, schedulable period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Slot {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Generate candidate slots for `[now, now + horizon_days]`.
///
/// Only configured work days contribute; the first day's window is clamped
/// to `now`. `blocked` spans (fixed events, hard constraint windows) are
/// subtracted before breaks are injected.
pub fn candidate_slots(
    now: DateTime<Utc>,
    horizon_days: u32,
    prefs: &Preferences,
    blocked: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Vec<Slot> {
    let tz = prefs.timezone;
    let today = now.with_timezone(&tz).date_naive();

    let mut sorted_blocked: Vec<(DateTime<Utc>, DateTime<Utc>)> = blocked
        .iter()
        .copied()
        .filter(|(start, end)| end > start)
        .collect();
    sorted_blocked.sort();

    let mut slots = Vec::new();
    for offset in 0..=i64::from(horizon_days) {
        let day = today + Duration::days(offset);
        if !prefs.is_work_day(day.weekday()) {
            continue;
        }

        let work_start = local_instant(tz, day, prefs.work_start);
        let work_end = local_instant(tz, day, prefs.work_end);
        let window_start = work_start.max(now);
        if window_start >= work_end {
            continue;
        }

        for (free_start, free_end) in subtract_blocked(window_start, work_end, &sorted_blocked) {
            inject_breaks(free_start, free_end, tz, day, prefs, &mut slots);
        }
    }
    slots
}

/// Resolve a local wall-clock time on a given day to a UTC instant.
/// DST gaps resolve to the earliest valid instant after the gap.
pub(crate) fn local_instant(tz: Tz, day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = day.and_time(time);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        chrono::LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

/// Free sub-periods of `[start, end)` once `blocked` (sorted) is removed.
fn subtract_blocked(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    blocked: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut free = Vec::new();
    let mut cursor = start;

    for &(block_start, block_end) in blocked {
        if block_end <= cursor || block_start >= end {
            continue;
        }
        if block_start > cursor {
            free.push((cursor, block_start));
        }
        cursor = cursor.max(block_end);
        if cursor >= end {
            break;
        }
    }
    if cursor < end {
        free.push((cursor, end));
    }
    free
}

/// Split a free period into focus chunks separated by breaks, skipping the
/// lunch window when it falls inside the period.
fn inject_breaks(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: Tz,
    day: NaiveDate,
    prefs: &Preferences,
    out: &mut Vec<Slot>,
) {
    let lunch_start = local_instant(tz, day, prefs.lunch_time);
    let lunch_end = lunch_start + Duration::minutes(i64::from(prefs.lunch_duration_minutes));
    let take_lunch = prefs.lunch_duration_minutes > 0;

    // A zero break frequency means uninterrupted focus periods.
    let frequency = if prefs.break_frequency_minutes == 0 {
        Duration::days(365)
    } else {
        Duration::minutes(i64::from(prefs.break_frequency_minutes))
    };

    let mut current = start;
    while current < end {
        let chunk_end = (current + frequency).min(end);

        if take_lunch && current <= lunch_start && lunch_start <= chunk_end {
            if current < lunch_start {
                out.push(Slot {
                    start: current,
                    end: lunch_start,
                });
            }
            current = lunch_end;
            continue;
        }

        if current < chunk_end {
            out.push(Slot {
                start: current,
                end: chunk_end,
            });
        }
        current = if chunk_end < end {
            chunk_end + Duration::minutes(i64::from(prefs.break_duration_minutes))
        } else {
            chunk_end
        };
    }
}
