use rust_decimal::Decimal;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::nutrition::units::ServingUnit;

/// Core nutrient amounts: kcal, grams, and milligrams for sodium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nutrients {
    pub calories: Decimal,
    pub protein: Decimal,
    pub carbs: Decimal,
    pub fat: Decimal,
    pub fiber: Decimal,
    pub sugar: Decimal,
    pub sodium: Decimal,
}

impl Nutrients {
    fn try_zip(&self, other: &Self, op: impl Fn(Decimal, Decimal) -> Option<Decimal>) -> Option<Self> {
        Some(Self {
            calories: op(self.calories, other.calories)?,
            protein: op(self.protein, other.protein)?,
            carbs: op(self.carbs, other.carbs)?,
            fat: op(self.fat, other.fat)?,
            fiber: op(self.fiber, other.fiber)?,
            sugar: op(self.sugar, other.sugar)?,
            sodium: op(self.sodium, other.sodium)?,
        })
    }

    /// `None` when any nutrient overflows.
    pub fn checked_scaled(&self, factor: Decimal) -> Option<Self> {
        self.try_zip(self, |v, _| v.checked_mul(factor))
    }

    /// `None` when any nutrient overflows.
    pub fn checked_add(&self, rhs: &Self) -> Option<Self> {
        self.try_zip(rhs, Decimal::checked_add)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct NutritionGoals {
    pub calorie_goal: Option<Decimal>,
    pub protein_goal: Option<Decimal>,
    pub carbs_goal: Option<Decimal>,
    pub fat_goal: Option<Decimal>,
}

/// Ratio of consumed to goal. `None` when no positive goal is configured
/// (or the ratio is not representable).
pub fn progress(total: Decimal, goal: Option<Decimal>) -> Option<Decimal> {
    goal.filter(|g| *g > Decimal::ZERO)
        .and_then(|g| total.checked_div(g))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoalProgress {
    pub calories: Option<Decimal>,
    pub protein: Option<Decimal>,
    pub carbs: Option<Decimal>,
    pub fat: Option<Decimal>,
}

/// Persisted per-(user, date) aggregate.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DailyNutrition {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: Date,
    pub total_calories: Decimal,
    pub total_protein: Decimal,
    pub total_carbs: Decimal,
    pub total_fat: Decimal,
    pub total_fiber: Decimal,
    pub total_sugar: Decimal,
    pub total_sodium: Decimal,
    pub calorie_goal: Option<Decimal>,
    pub protein_goal: Option<Decimal>,
    pub carbs_goal: Option<Decimal>,
    pub fat_goal: Option<Decimal>,
    pub meal_count: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl DailyNutrition {
    pub fn totals(&self) -> Nutrients {
        Nutrients {
            calories: self.total_calories,
            protein: self.total_protein,
            carbs: self.total_carbs,
            fat: self.total_fat,
            fiber: self.total_fiber,
            sugar: self.total_sugar,
            sodium: self.total_sodium,
        }
    }

    pub fn goals(&self) -> NutritionGoals {
        NutritionGoals {
            calorie_goal: self.calorie_goal,
            protein_goal: self.protein_goal,
            carbs_goal: self.carbs_goal,
            fat_goal: self.fat_goal,
        }
    }

    pub fn progress(&self) -> GoalProgress {
        GoalProgress {
            calories: progress(self.total_calories, self.calorie_goal),
            protein: progress(self.total_protein, self.protein_goal),
            carbs: progress(self.total_carbs, self.carbs_goal),
            fat: progress(self.total_fat, self.fat_goal),
        }
    }
}

/// What the aggregator writes for one (user, date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyTotals {
    pub user_id: Uuid,
    pub date: Date,
    pub totals: Nutrients,
    pub goals: NutritionGoals,
    pub meal_count: i32,
}

/// Per-serving nutrient data of a food, as needed for scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoodNutrients {
    pub food_id: Uuid,
    pub serving_size: Decimal,
    pub serving_unit: ServingUnit,
    pub per_serving: Nutrients,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub entry_id: Uuid,
    pub food_id: Uuid,
    pub quantity: Decimal,
    pub unit: ServingUnit,
    /// `None` when the referenced food no longer exists.
    pub food: Option<FoodNutrients>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealSnapshot {
    pub meal_id: Uuid,
    pub entries: Vec<EntrySnapshot>,
}

/// Everything needed to recompute one day for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySnapshot {
    pub goals: NutritionGoals,
    pub meals: Vec<MealSnapshot>,
}
