use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::nutrition::repo_types::{FoodNutrients, Nutrients};
use crate::nutrition::units::ServingUnit;

/// Where a food record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "food_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FoodOrigin {
    Custom,
    OpenFoodFacts,
}

#[derive(Debug, Clone, FromRow)]
pub struct Food {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub serving_size: Decimal,
    pub serving_unit: ServingUnit,
    pub calories: Decimal,
    pub protein: Decimal,
    pub carbs: Decimal,
    pub fat: Decimal,
    pub fiber: Decimal,
    pub sugar: Decimal,
    pub sodium: Decimal,
    pub saturated_fat: Option<Decimal>,
    pub cholesterol: Option<Decimal>,
    pub potassium: Option<Decimal>,
    pub source: FoodOrigin,
    pub external_id: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

impl Food {
    pub fn per_serving(&self) -> Nutrients {
        Nutrients {
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            fiber: self.fiber,
            sugar: self.sugar,
            sodium: self.sodium,
        }
    }

    pub fn nutrients(&self) -> FoodNutrients {
        FoodNutrients {
            food_id: self.id,
            serving_size: self.serving_size,
            serving_unit: self.serving_unit,
            per_serving: self.per_serving(),
        }
    }

    /// Cached provider foods are immutable; custom foods belong to their creator.
    pub fn is_editable_by(&self, user_id: Uuid) -> bool {
        self.source == FoodOrigin::Custom && self.created_by == Some(user_id)
    }

    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        self.source != FoodOrigin::Custom || self.created_by == Some(user_id)
    }
}

/// Values for inserting or replacing a food.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFood {
    pub name: String,
    pub brand: Option<String>,
    pub serving_size: Decimal,
    pub serving_unit: ServingUnit,
    pub nutrients: Nutrients,
    pub saturated_fat: Option<Decimal>,
    pub cholesterol: Option<Decimal>,
    pub potassium: Option<Decimal>,
    pub source: FoodOrigin,
    pub external_id: Option<String>,
    pub created_by: Option<Uuid>,
}
