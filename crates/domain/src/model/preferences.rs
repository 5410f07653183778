//! Per-user scheduling profile.

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A half-open local time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

/// Normalized view of a user's working hours, breaks, and energy profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// IANA timezone all local times below are interpreted in.
    pub timezone: Tz,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub work_days: Vec<Weekday>,
    /// Minutes of focused work between breaks.
    pub break_frequency_minutes: u32,
    pub break_duration_minutes: u32,
    pub lunch_time: NaiveTime,
    pub lunch_duration_minutes: u32,
    pub preferred_task_duration_minutes: u32,
    /// Half-open local ranges of peak energy; must lie inside the work window.
    #[serde(default)]
    pub energy_peaks: Vec<TimeRange>,
    /// No task starts at or after this local time.
    #[serde(default)]
    pub avoid_after: Option<NaiveTime>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            work_start: t(9, 0),
            work_end: t(17, 0),
            work_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            break_frequency_minutes: 90,
            break_duration_minutes: 15,
            lunch_time: t(12, 0),
            lunch_duration_minutes: 60,
            preferred_task_duration_minutes: 90,
            energy_peaks: Vec::new(),
            avoid_after: None,
        }
    }
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

impl Preferences {
    pub fn validate(&self) -> Result<()> {
        if self.work_end <= self.work_start {
            return Err(Error::Validation(
                "work_end must be after work_start".into(),
            ));
        }
        if self.work_days.is_empty() {
            return Err(Error::Validation(
                "at least one work day is required".into(),
            ));
        }
        for peak in &self.energy_peaks {
            if peak.end <= peak.start {
                return Err(Error::Validation(
                    "energy peak must be a non-empty range".into(),
                ));
            }
            if peak.start < self.work_start || peak.end > self.work_end {
                return Err(Error::Validation(
                    "energy peaks must lie within the work window".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_work_day(&self, day: Weekday) -> bool {
        self.work_days.contains(&day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preferences_validate() {
        assert!(Preferences::default().validate().is_ok());
    }

    #[test]
    fn inverted_work_window_rejected() {
        let prefs = Preferences {
            work_start: t(17, 0),
            work_end: t(9, 0),
            ..Default::default()
        };
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn energy_peak_outside_window_rejected() {
        let prefs = Preferences {
            energy_peaks: vec![TimeRange {
                start: t(7, 0),
                end: t(10, 0),
            }],
            ..Default::default()
        };
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn energy_peak_inside_window_accepted() {
        let prefs = Preferences {
            energy_peaks: vec![TimeRange {
                start: t(9, 0),
                end: t(11, 0),
            }],
            ..Default::default()
        };
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn time_range_is_half_open() {
        let range = TimeRange {
            start: t(9, 0),
            end: t(11, 0),
        };
        assert!(range.contains(t(9, 0)));
        assert!(range.contains(t(10, 59)));
        assert!(!range.contains(t(11, 0)));
    }
}
