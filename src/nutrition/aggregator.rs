//! Sums food-entry contributions into meal and day totals and persists the
//! daily aggregate.
//!
//! Totals are accumulated at full decimal precision; rounding is left to the
//! response DTOs.

use time::Date;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::nutrition::repo_types::{
    DailyNutrition, DailyTotals, EntrySnapshot, MealSnapshot, Nutrients,
};
use crate::nutrition::store::NutritionStore;
use crate::nutrition::units::conversion_factor;

fn overflow(what: String) -> AppError {
    AppError::validation(format!("{what} exceeds the representable nutrient range"))
}

/// Nutrients contributed by one entry. A missing food is an integrity error.
pub fn entry_contribution(entry: &EntrySnapshot) -> Result<Nutrients, AppError> {
    let food = entry.food.as_ref().ok_or_else(|| {
        AppError::DataIntegrity(format!(
            "food entry {} references missing food {}",
            entry.entry_id, entry.food_id
        ))
    })?;
    let factor = conversion_factor(entry.quantity, entry.unit, food.serving_size, food.serving_unit)
        .map_err(|e| match e {
            AppError::Validation(msg) => {
                AppError::Validation(format!("food entry {}: {msg}", entry.entry_id))
            }
            other => other,
        })?;
    food.per_serving
        .checked_scaled(factor)
        .ok_or_else(|| overflow(format!("food entry {}", entry.entry_id)))
}

pub fn meal_totals(meal: &MealSnapshot) -> Result<Nutrients, AppError> {
    meal.entries.iter().try_fold(Nutrients::default(), |acc, entry| {
        acc.checked_add(&entry_contribution(entry)?)
            .ok_or_else(|| overflow(format!("meal {}", meal.meal_id)))
    })
}

pub fn day_totals(meals: &[MealSnapshot]) -> Result<Nutrients, AppError> {
    meals.iter().try_fold(Nutrients::default(), |acc, meal| {
        acc.checked_add(&meal_totals(meal)?)
            .ok_or_else(|| overflow("daily total".to_string()))
    })
}

/// Recomputes and stores the aggregate for (user, date).
///
/// Takes the per-day lock first, so concurrent recomputations of the same day
/// run one after the other and the last writer saw every earlier commit.
/// Nothing is written unless every entry of the day could be accounted for.
#[instrument(skip(store))]
pub async fn recompute_daily<S>(
    store: &mut S,
    user_id: Uuid,
    date: Date,
) -> Result<DailyNutrition, AppError>
where
    S: NutritionStore + ?Sized,
{
    store.lock_day(user_id, date).await?;
    let snapshot = store.load_day(user_id, date).await?.ok_or_else(|| {
        AppError::DataIntegrity(format!("user {user_id} does not exist"))
    })?;

    let totals = day_totals(&snapshot.meals).map_err(|e| {
        warn!(error = %e, %user_id, %date, "daily aggregation aborted");
        e
    })?;
    let meal_count = i32::try_from(snapshot.meals.len())
        .map_err(|_| AppError::validation("too many meals for one day"))?;

    let record = store
        .upsert_daily(&DailyTotals {
            user_id,
            date,
            totals,
            goals: snapshot.goals,
            meal_count,
        })
        .await?;

    debug!(
        %user_id,
        %date,
        meal_count,
        total_calories = %record.total_calories,
        "daily nutrition recomputed"
    );
    Ok(record)
}

/// Recomputes several days of one user in a fixed order, so two units of
/// work touching the same days take their locks in the same sequence.
pub async fn recompute_days<S>(
    store: &mut S,
    user_id: Uuid,
    dates: &[Date],
) -> Result<(), AppError>
where
    S: NutritionStore + ?Sized,
{
    let mut dates = dates.to_vec();
    dates.sort_unstable();
    dates.dedup();
    for date in dates {
        recompute_daily(&mut *store, user_id, date).await?;
    }
    Ok(())
}
