//! Recurrence schedules for workflow templates
//!
//! Schedules are hour-granular. Evaluation is a pure function of an
//! explicit timestamp so the scheduler (and tests) control the clock;
//! nothing here reads `Utc::now()`.

use crate::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// When a template's runs recur
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_type: ScheduleType,
    /// Hour of day, 0-23
    pub hour: u32,
    /// Day of week for weekly schedules, 0 = Sunday .. 6 = Saturday
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    /// Day of month for monthly schedules, 1-31; clamped to the last
    /// day of shorter months
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
}

/// Recurrence kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    /// Never fires
    None,
    Daily,
    Weekly,
    Monthly,
    /// Fires a single time, then the template schedule is disarmed
    Once,
}

impl Schedule {
    pub fn daily(hour: u32) -> Self {
        Self {
            schedule_type: ScheduleType::Daily,
            hour,
            day_of_week: None,
            day_of_month: None,
        }
    }

    pub fn weekly(day_of_week: u32, hour: u32) -> Self {
        Self {
            schedule_type: ScheduleType::Weekly,
            hour,
            day_of_week: Some(day_of_week),
            day_of_month: None,
        }
    }

    pub fn monthly(day_of_month: u32, hour: u32) -> Self {
        Self {
            schedule_type: ScheduleType::Monthly,
            hour,
            day_of_week: None,
            day_of_month: Some(day_of_month),
        }
    }

    pub fn once(hour: u32) -> Self {
        Self {
            schedule_type: ScheduleType::Once,
            hour,
            day_of_week: None,
            day_of_month: None,
        }
    }

    /// Check whether `now` falls in a firing window.
    ///
    /// Hour-granular: the schedule matches for the whole matching hour.
    /// Firing at most once per window is the scheduler's job.
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        match self.schedule_type {
            ScheduleType::None => false,
            ScheduleType::Daily | ScheduleType::Once => now.hour() == self.hour,
            ScheduleType::Weekly => {
                now.hour() == self.hour
                    && self.day_of_week == Some(now.weekday().num_days_from_sunday())
            }
            ScheduleType::Monthly => {
                let Some(day) = self.day_of_month else {
                    return false;
                };
                let effective = day.min(days_in_month(now.year(), now.month()));
                now.hour() == self.hour && now.day() == effective
            }
        }
    }

    /// Validate field ranges
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.hour > 23 {
            return Err(WorkflowError::ValidationError(format!(
                "schedule hour {} out of range",
                self.hour
            )));
        }
        if self.schedule_type == ScheduleType::Weekly {
            match self.day_of_week {
                Some(0..=6) => {}
                _ => {
                    return Err(WorkflowError::ValidationError(
                        "weekly schedule requires a day of week 0-6".into(),
                    ))
                }
            }
        }
        if self.schedule_type == ScheduleType::Monthly {
            match self.day_of_month {
                Some(1..=31) => {}
                _ => {
                    return Err(WorkflowError::ValidationError(
                        "monthly schedule requires a day of month 1-31".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Display string for the UI, e.g. `daily 9:00am`, `Monday 9:00am`,
    /// `15th 9:00am`, `Once`
    pub fn describe(&self) -> String {
        match self.schedule_type {
            ScheduleType::None => "Not scheduled".to_string(),
            ScheduleType::Daily => format!("daily {}", format_hour(self.hour)),
            ScheduleType::Weekly => {
                let day = self.day_of_week.map(day_name).unwrap_or("?");
                format!("{} {}", day, format_hour(self.hour))
            }
            ScheduleType::Monthly => {
                let day = self.day_of_month.unwrap_or(1);
                format!("{} {}", ordinal(day), format_hour(self.hour))
            }
            ScheduleType::Once => "Once".to_string(),
        }
    }
}

fn day_name(day_of_week: u32) -> &'static str {
    match day_of_week {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "?",
    }
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", day, suffix)
}

fn format_hour(hour: u32) -> String {
    let (display, suffix) = match hour {
        0 => (12, "am"),
        1..=11 => (hour, "am"),
        12 => (12, "pm"),
        _ => (hour - 12, "pm"),
    };
    format!("{}:00{}", display, suffix)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_matches_on_hour() {
        let schedule = Schedule::daily(9);
        assert!(schedule.matches(at(2025, 6, 2, 9)));
        assert!(!schedule.matches(at(2025, 6, 2, 10)));
    }

    #[test]
    fn test_weekly_requires_day_and_hour() {
        // 2025-06-02 is a Monday
        let schedule = Schedule::weekly(1, 9);
        assert!(schedule.matches(at(2025, 6, 2, 9)));
        assert!(!schedule.matches(at(2025, 6, 2, 8)));
        assert!(!schedule.matches(at(2025, 6, 3, 9))); // Tuesday
    }

    #[test]
    fn test_monthly_matches_on_day() {
        let schedule = Schedule::monthly(15, 7);
        assert!(schedule.matches(at(2025, 3, 15, 7)));
        assert!(!schedule.matches(at(2025, 3, 16, 7)));
    }

    #[test]
    fn test_monthly_clamps_to_short_months() {
        let schedule = Schedule::monthly(31, 7);
        // April has 30 days: the 31st clamps to the 30th
        assert!(schedule.matches(at(2025, 4, 30, 7)));
        assert!(!schedule.matches(at(2025, 4, 29, 7)));
        // February in a non-leap year clamps to the 28th
        assert!(schedule.matches(at(2025, 2, 28, 7)));
        // ...and to the 29th in a leap year
        assert!(schedule.matches(at(2024, 2, 29, 7)));
        assert!(!schedule.matches(at(2024, 2, 28, 7)));
        // In a 31-day month only the real day matches
        assert!(schedule.matches(at(2025, 5, 31, 7)));
        assert!(!schedule.matches(at(2025, 5, 30, 7)));
    }

    #[test]
    fn test_once_matches_on_hour() {
        let schedule = Schedule::once(14);
        assert!(schedule.matches(at(2025, 6, 2, 14)));
        assert!(!schedule.matches(at(2025, 6, 2, 15)));
    }

    #[test]
    fn test_none_never_matches() {
        let schedule = Schedule {
            schedule_type: ScheduleType::None,
            hour: 9,
            day_of_week: None,
            day_of_month: None,
        };
        assert!(!schedule.matches(at(2025, 6, 2, 9)));
    }

    #[test]
    fn test_validate_ranges() {
        assert!(Schedule::daily(23).validate().is_ok());
        assert!(Schedule::daily(24).validate().is_err());
        assert!(Schedule::weekly(7, 9).validate().is_err());
        assert!(Schedule::monthly(0, 9).validate().is_err());
        assert!(Schedule::monthly(31, 9).validate().is_ok());

        let missing_day = Schedule {
            schedule_type: ScheduleType::Weekly,
            hour: 9,
            day_of_week: None,
            day_of_month: None,
        };
        assert!(missing_day.validate().is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(Schedule::daily(9).describe(), "daily 9:00am");
        assert_eq!(Schedule::daily(0).describe(), "daily 12:00am");
        assert_eq!(Schedule::daily(12).describe(), "daily 12:00pm");
        assert_eq!(Schedule::daily(17).describe(), "daily 5:00pm");
        assert_eq!(Schedule::weekly(1, 9).describe(), "Monday 9:00am");
        assert_eq!(Schedule::monthly(1, 8).describe(), "1st 8:00am");
        assert_eq!(Schedule::monthly(22, 8).describe(), "22nd 8:00am");
        assert_eq!(Schedule::once(10).describe(), "Once");
    }
}
