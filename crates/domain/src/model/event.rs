//! Calendar events — externally sourced or orchestrator-managed.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::model::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    External,
    Managed,
}

/// A time-bounded occurrence on a user's calendar.
///
/// Instants are stored UTC; `timezone` carries the originating IANA zone for
/// display and all-day normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_all_day: bool,
    pub source: EventSource,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub is_moveable: bool,
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

fn rrule_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^FREQ=(DAILY|WEEKLY|MONTHLY|YEARLY)(;[A-Z]+=[^;]+)*$")
            .unwrap_or_else(|_| unreachable!("static regex"))
    })
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<()> {
        if !self.is_all_day && self.end_time <= self.start_time {
            return Err(Error::Validation(format!(
                "event '{}': end_time must be after start_time",
                self.id
            )));
        }
        if let Some(rule) = &self.recurrence_rule {
            if !rrule_shape().is_match(rule) {
                return Err(Error::Validation(format!(
                    "event '{}': recurrence_rule '{rule}' is not a FREQ=... rule",
                    self.id
                )));
            }
        }
        Ok(())
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence_rule.is_some()
    }

    /// The event's IANA timezone, defaulting to UTC when absent or unknown.
    pub fn tz(&self) -> Tz {
        self.timezone
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or(Tz::UTC)
    }

    /// The comparable span of the event.
    ///
    /// All-day events occupy `[midnight, midnight + 1 day)` of each covered
    /// local day in the event's timezone, independent of the stored
    /// timestamps' time-of-day.
    pub fn effective_span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        if !self.is_all_day {
            return (self.start_time, self.end_time);
        }
        let tz = self.tz();
        let start_day = self.start_time.with_timezone(&tz).date_naive();
        // A degenerate all-day event (end <= start) still covers one day.
        let end_day = self
            .end_time
            .with_timezone(&tz)
            .date_naive()
            .max(start_day);
        let start = local_midnight(tz, start_day);
        let end = local_midnight(tz, end_day) + Duration::days(1);
        (start, end)
    }
}

fn local_midnight(tz: Tz, day: chrono::NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(chrono::NaiveTime::MIN);
    // DST gaps at midnight resolve to the earliest valid instant.
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

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider-facing records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fields accepted when creating an event through a calendar provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Partial update applied to a provider-held event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// A calendar listed by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub primary: bool,
}
