use std::str::FromStr;

use cron::Schedule;

/// A wall-clock time of day parsed from the `H:MM AM/PM` form users type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTime {
    /// 0..=23
    pub hour: u32,
    /// 0..=59
    pub minute: u32,
}

impl DailyTime {
    /// Parses `H:MM AM/PM`: a 1 or 2 digit hour from 1 to 12, a 2 digit
    /// minute, then a case-insensitive meridiem with optional spaces before
    /// it. Anything else is rejected.
    pub fn parse(input: &str) -> Option<Self> {
        let upper = input.to_ascii_uppercase();
        let (clock, pm) = if let Some(rest) = upper.strip_suffix("AM") {
            (rest, false)
        } else if let Some(rest) = upper.strip_suffix("PM") {
            (rest, true)
        } else {
            return None;
        };
        let clock = clock.trim_end();

        let (hour_part, minute_part) = clock.split_once(':')?;
        if hour_part.is_empty()
            || hour_part.len() > 2
            || !hour_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        if minute_part.len() != 2 || !minute_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let hour12: u32 = hour_part.parse().ok()?;
        let minute: u32 = minute_part.parse().ok()?;
        if !(1..=12).contains(&hour12) || minute > 59 {
            return None;
        }

        let hour = match (hour12, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        Some(Self { hour, minute })
    }

    /// Cron expression firing once a day at this time.
    pub fn cron_expr(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }

    pub fn schedule(&self) -> Schedule {
        // Built from validated fields, so parsing cannot fail.
        Schedule::from_str(&self.cron_expr()).expect("daily cron expression is well-formed")
    }
}
