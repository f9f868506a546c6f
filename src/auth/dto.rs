use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::error::AppError;
use crate::nutrition::dto::present;
use crate::nutrition::repo_types::NutritionGoals;
use crate::nutrition::units::MAX_NUTRIENT_AMOUNT;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response returned after successful auth.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalsBody {
    pub calorie_goal: Option<f64>,
    pub protein_goal: Option<f64>,
    pub carbs_goal: Option<f64>,
    pub fat_goal: Option<f64>,
}

fn goal_to_decimal(name: &str, value: Option<f64>) -> Result<Option<Decimal>, AppError> {
    let Some(v) = value else {
        return Ok(None);
    };
    let out_of_range = || {
        AppError::validation(format!(
            "{name} must be between 0.01 and {MAX_NUTRIENT_AMOUNT}"
        ))
    };
    if !v.is_finite() {
        return Err(out_of_range());
    }
    let goal = Decimal::try_from(v).map_err(|_| out_of_range())?;
    if goal < Decimal::new(1, 2) || goal > Decimal::from(MAX_NUTRIENT_AMOUNT) {
        return Err(out_of_range());
    }
    Ok(Some(goal))
}

impl GoalsBody {
    pub fn into_goals(self) -> Result<NutritionGoals, AppError> {
        Ok(NutritionGoals {
            calorie_goal: goal_to_decimal("calorie_goal", self.calorie_goal)?,
            protein_goal: goal_to_decimal("protein_goal", self.protein_goal)?,
            carbs_goal: goal_to_decimal("carbs_goal", self.carbs_goal)?,
            fat_goal: goal_to_decimal("fat_goal", self.fat_goal)?,
        })
    }
}

/// Public part of the user returned in API responses.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub goals: GoalsBody,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            goals: GoalsBody {
                calorie_goal: u.calorie_goal.map(present),
                protein_goal: u.protein_goal.map(present),
                carbs_goal: u.carbs_goal.map(present),
                fat_goal: u.fat_goal.map(present),
            },
        }
    }
}
