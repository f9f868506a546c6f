use rust_decimal::Decimal;
use sqlx::FromRow;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use crate::meals::category::MealCategory;
use crate::nutrition::units::ServingUnit;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub date: Date,
    pub time: Option<Time>,
    pub category: MealCategory,
    pub is_custom_category: bool,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FoodEntry {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub food_id: Uuid,
    pub quantity: Decimal,
    pub unit: ServingUnit,
    pub created_at: OffsetDateTime,
}

/// Column values of a meal insert or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealFields {
    pub name: String,
    pub date: Date,
    pub time: Option<Time>,
    pub category: MealCategory,
    pub is_custom_category: bool,
    pub notes: Option<String>,
}
