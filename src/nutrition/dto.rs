use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, OffsetDateTime};

use crate::error::AppError;
use crate::nutrition::repo_types::{DailyNutrition, Nutrients};

pub fn parse_date(s: &str) -> Result<Date, AppError> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::validation(format!("invalid date '{s}', expected YYYY-MM-DD")))
}

/// Rounds to two decimal places for display.
pub fn present(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64().unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NutrientTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
}

impl From<Nutrients> for NutrientTotals {
    fn from(n: Nutrients) -> Self {
        Self {
            calories: present(n.calories),
            protein: present(n.protein),
            carbs: present(n.carbs),
            fat: present(n.fat),
            fiber: present(n.fiber),
            sugar: present(n.sugar),
            sodium: present(n.sodium),
        }
    }
}

/// Goal values and progress ratios. `null` means no goal is configured.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GoalView {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DailyNutritionResponse {
    pub date: Date,
    pub totals: NutrientTotals,
    pub goals: GoalView,
    pub progress: GoalView,
    pub meal_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<DailyNutrition> for DailyNutritionResponse {
    fn from(r: DailyNutrition) -> Self {
        let goals = r.goals();
        let progress = r.progress();
        Self {
            date: r.date,
            totals: r.totals().into(),
            goals: GoalView {
                calories: goals.calorie_goal.map(present),
                protein: goals.protein_goal.map(present),
                carbs: goals.carbs_goal.map(present),
                fat: goals.fat_goal.map(present),
            },
            progress: GoalView {
                calories: progress.calories.map(present),
                protein: progress.protein.map(present),
                carbs: progress.carbs.map(present),
                fat: progress.fat.map(present),
            },
            meal_count: r.meal_count,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub start: String,
    pub end: String,
}
