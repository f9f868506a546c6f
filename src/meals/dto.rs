use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::meals::category::{format_time_of_day, MealCategory};
use crate::meals::repo_types::Meal;
use crate::nutrition::dto::NutrientTotals;
use crate::nutrition::units::ServingUnit;

/// Body for creating or replacing a meal.
#[derive(Debug, Clone, Deserialize)]
pub struct MealBody {
    pub name: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`, 24-hour
    pub time: Option<String>,
    /// Overrides the time-derived category.
    pub category: Option<MealCategory>,
    pub notes: Option<String>,
    /// Drop a previous override and derive the category from `time` again.
    #[serde(default)]
    pub reset_category: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryBody {
    pub food_id: Uuid,
    pub quantity: f64,
    pub unit: ServingUnit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryUpdateBody {
    pub quantity: f64,
    pub unit: ServingUnit,
}

#[derive(Debug, Deserialize)]
pub struct MealListQuery {
    pub date: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    pub id: Uuid,
    pub food_id: Uuid,
    pub food_name: String,
    pub brand: Option<String>,
    pub quantity: f64,
    pub unit: ServingUnit,
    pub nutrients: NutrientTotals,
}

#[derive(Debug, Serialize)]
pub struct MealResponse {
    pub id: Uuid,
    pub name: String,
    pub date: Date,
    pub time: Option<String>,
    pub category: MealCategory,
    pub is_custom_category: bool,
    pub notes: Option<String>,
    pub entries: Vec<EntryView>,
    pub totals: NutrientTotals,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MealResponse {
    pub fn new(meal: Meal, entries: Vec<EntryView>, totals: NutrientTotals) -> Self {
        Self {
            id: meal.id,
            name: meal.name,
            date: meal.date,
            time: meal.time.map(format_time_of_day),
            category: meal.category,
            is_custom_category: meal.is_custom_category,
            notes: meal.notes,
            entries,
            totals,
            created_at: meal.created_at,
            updated_at: meal.updated_at,
        }
    }
}
