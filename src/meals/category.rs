use serde::{Deserialize, Serialize};
use time::Time;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meal_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

const BREAKFAST_START: u16 = 5 * 60;
const LUNCH_START: u16 = 11 * 60;
const AFTERNOON_SNACK_START: u16 = 15 * 60;
const DINNER_START: u16 = 18 * 60;
const EVENING_SNACK_START: u16 = 19 * 60;
const MINUTES_PER_DAY: u16 = 24 * 60;

/// Category for a minute of the day (0..1440). Bounds are inclusive below,
/// exclusive above.
pub fn category_for_minutes(minutes: u16) -> MealCategory {
    debug_assert!(minutes < MINUTES_PER_DAY);
    match minutes {
        m if m < BREAKFAST_START => MealCategory::Snack,
        m if m < LUNCH_START => MealCategory::Breakfast,
        m if m < AFTERNOON_SNACK_START => MealCategory::Lunch,
        m if m < DINNER_START => MealCategory::Snack,
        m if m < EVENING_SNACK_START => MealCategory::Dinner,
        _ => MealCategory::Snack,
    }
}

pub fn category_for_time(t: Time) -> MealCategory {
    category_for_minutes(u16::from(t.hour()) * 60 + u16::from(t.minute()))
}

/// Parses a strict 24-hour `HH:MM` string.
pub fn parse_time_of_day(s: &str) -> Result<Time, AppError> {
    let invalid = || AppError::validation(format!("invalid time '{s}', expected HH:MM"));

    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(invalid());
    }
    let (hh, mm) = (&s[0..2], &s[3..5]);
    if !hh.bytes().chain(mm.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u8 = hh.parse().map_err(|_| invalid())?;
    let minute: u8 = mm.parse().map_err(|_| invalid())?;
    Time::from_hms(hour, minute, 0).map_err(|_| invalid())
}

pub fn format_time_of_day(t: Time) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

/// Category for an optional `HH:MM` string. Absent or empty input is a snack.
pub fn classify(time: Option<&str>) -> Result<MealCategory, AppError> {
    match time.map(str::trim) {
        None | Some("") => Ok(MealCategory::Snack),
        Some(s) => parse_time_of_day(s).map(category_for_time),
    }
}

/// Resolves the stored category and custom flag for a meal. The time is
/// validated even when an explicit category makes it irrelevant.
pub fn resolve_category(
    time: Option<&str>,
    explicit: Option<MealCategory>,
) -> Result<(MealCategory, bool), AppError> {
    let derived = classify(time)?;
    Ok(match explicit {
        Some(category) => (category, true),
        None => (derived, false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u8, m: u8) -> String {
        format!("{h:02}:{m:02}")
    }

    fn assert_range(from: u16, to: u16, expected: MealCategory) {
        for minutes in from..to {
            let s = hm((minutes / 60) as u8, (minutes % 60) as u8);
            assert_eq!(classify(Some(&s)).unwrap(), expected, "at {s}");
        }
    }

    #[test]
    fn every_minute_of_the_day_lands_in_its_window() {
        assert_range(0, 300, MealCategory::Snack);
        assert_range(300, 660, MealCategory::Breakfast);
        assert_range(660, 900, MealCategory::Lunch);
        assert_range(900, 1080, MealCategory::Snack);
        assert_range(1080, 1140, MealCategory::Dinner);
        assert_range(1140, 1440, MealCategory::Snack);
    }

    #[test]
    fn window_edges() {
        assert_eq!(classify(Some("04:59")).unwrap(), MealCategory::Snack);
        assert_eq!(classify(Some("05:00")).unwrap(), MealCategory::Breakfast);
        assert_eq!(classify(Some("10:59")).unwrap(), MealCategory::Breakfast);
        assert_eq!(classify(Some("11:00")).unwrap(), MealCategory::Lunch);
        assert_eq!(classify(Some("15:00")).unwrap(), MealCategory::Snack);
        assert_eq!(classify(Some("18:00")).unwrap(), MealCategory::Dinner);
        assert_eq!(classify(Some("18:59")).unwrap(), MealCategory::Dinner);
        assert_eq!(classify(Some("19:00")).unwrap(), MealCategory::Snack);
        assert_eq!(classify(Some("23:59")).unwrap(), MealCategory::Snack);
    }

    #[test]
    fn missing_time_is_a_snack() {
        assert_eq!(classify(None).unwrap(), MealCategory::Snack);
        assert_eq!(classify(Some("")).unwrap(), MealCategory::Snack);
    }

    #[test]
    fn malformed_times_are_rejected() {
        for bad in ["8:30", "24:00", "12:60", "ab:cd", "12-30", "12:30:00", "+1:30", "noon"] {
            let err = classify(Some(bad)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn explicit_category_marks_custom() {
        let t = Some("08:30");
        assert_eq!(resolve_category(t, None).unwrap(), (MealCategory::Breakfast, false));
        assert_eq!(
            resolve_category(t, Some(MealCategory::Dinner)).unwrap(),
            (MealCategory::Dinner, true)
        );
        assert_eq!(resolve_category(None, None).unwrap(), (MealCategory::Snack, false));
    }

    #[test]
    fn explicit_category_does_not_excuse_a_bad_time() {
        let err = resolve_category(Some("25:00"), Some(MealCategory::Lunch)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn time_formats_back_to_hh_mm() {
        let t = parse_time_of_day("07:05").unwrap();
        assert_eq!(format_time_of_day(t), "07:05");
    }
}
