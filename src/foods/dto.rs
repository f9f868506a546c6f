use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::foods::repo_types::{Food, FoodOrigin, NewFood};
use crate::nutrition::dto::{present, NutrientTotals};
use crate::nutrition::repo_types::Nutrients;
use crate::nutrition::units::{validate_nutrient_amount, validate_serving_size, ServingUnit};

const MAX_NAME_LEN: usize = 200;

/// Body for creating or replacing a custom food. Nutrients are per serving.
#[derive(Debug, Clone, Deserialize)]
pub struct FoodBody {
    pub name: String,
    pub brand: Option<String>,
    pub serving_size: f64,
    pub serving_unit: ServingUnit,
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default)]
    pub sodium: f64,
    pub saturated_fat: Option<f64>,
    pub cholesterol: Option<f64>,
    pub potassium: Option<f64>,
}

fn to_decimal(name: &str, v: f64) -> Result<Decimal, AppError> {
    if !v.is_finite() {
        return Err(AppError::validation(format!("{name} must be a finite number")));
    }
    Decimal::try_from(v).map_err(|_| AppError::validation(format!("{name} is out of range")))
}

fn nutrient(name: &str, v: f64) -> Result<Decimal, AppError> {
    let amount = to_decimal(name, v)?;
    validate_nutrient_amount(name, amount)?;
    Ok(amount)
}

fn optional_nutrient(name: &str, v: Option<f64>) -> Result<Option<Decimal>, AppError> {
    v.map(|v| nutrient(name, v)).transpose()
}

impl FoodBody {
    pub fn into_new_food(self, created_by: Uuid) -> Result<NewFood, AppError> {
        let name = self.name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::validation(format!(
                "name must be 1..={MAX_NAME_LEN} characters"
            )));
        }
        let serving_size = to_decimal("serving_size", self.serving_size)?;
        validate_serving_size(serving_size)?;
        Ok(NewFood {
            name,
            brand: self
                .brand
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty()),
            serving_size,
            serving_unit: self.serving_unit,
            nutrients: Nutrients {
                calories: nutrient("calories", self.calories)?,
                protein: nutrient("protein", self.protein)?,
                carbs: nutrient("carbs", self.carbs)?,
                fat: nutrient("fat", self.fat)?,
                fiber: nutrient("fiber", self.fiber)?,
                sugar: nutrient("sugar", self.sugar)?,
                sodium: nutrient("sodium", self.sodium)?,
            },
            saturated_fat: optional_nutrient("saturated_fat", self.saturated_fat)?,
            cholesterol: optional_nutrient("cholesterol", self.cholesterol)?,
            potassium: optional_nutrient("potassium", self.potassium)?,
            source: FoodOrigin::Custom,
            external_id: None,
            created_by: Some(created_by),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FoodResponse {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub serving_size: f64,
    pub serving_unit: ServingUnit,
    pub nutrients: NutrientTotals,
    pub saturated_fat: Option<f64>,
    pub cholesterol: Option<f64>,
    pub potassium: Option<f64>,
    pub source: FoodOrigin,
    pub barcode: Option<String>,
    pub editable: bool,
}

impl FoodResponse {
    pub fn for_user(food: Food, user_id: Uuid) -> Self {
        let editable = food.is_editable_by(user_id);
        Self {
            id: food.id,
            nutrients: food.per_serving().into(),
            name: food.name,
            brand: food.brand,
            serving_size: present(food.serving_size),
            serving_unit: food.serving_unit,
            saturated_fat: food.saturated_fat.map(present),
            cholesterol: food.cholesterol.map(present),
            potassium: food.potassium.map(present),
            source: food.source,
            barcode: food.external_id,
            editable,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FoodListQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ExternalSearchQuery {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}
