use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgConnection;
use time::Date;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    foods::{repo as foods_repo, repo_types::Food},
    meals::{
        category::{parse_time_of_day, resolve_category, MealCategory},
        dto::{EntryBody, EntryUpdateBody, EntryView, MealBody, MealResponse},
        repo,
        repo_types::{FoodEntry, Meal, MealFields},
    },
    nutrition::{
        aggregator::{entry_contribution, recompute_days},
        dto::{parse_date, present},
        repo_types::{EntrySnapshot, Nutrients},
        units::{conversion_factor, validate_quantity, ServingUnit},
    },
    state::AppState,
};

const MAX_MEAL_NAME_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 2000;

/// Category for a meal being created (`existing = None`) or replaced.
///
/// An explicit category always wins and marks the meal custom. Otherwise a
/// custom meal keeps its category unless `reset` is set, and an automatic one
/// follows its (possibly new) time.
pub fn next_category(
    existing: Option<&Meal>,
    time: Option<&str>,
    explicit: Option<MealCategory>,
    reset: bool,
) -> Result<(MealCategory, bool), AppError> {
    match (explicit, existing) {
        (None, Some(m)) if m.is_custom_category && !reset => Ok((m.category, true)),
        _ => resolve_category(time, explicit),
    }
}

pub(crate) fn meal_fields(body: MealBody, existing: Option<&Meal>) -> Result<MealFields, AppError> {
    let name = body.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_MEAL_NAME_LEN {
        return Err(AppError::validation(format!(
            "name must be 1..={MAX_MEAL_NAME_LEN} characters"
        )));
    }
    let notes = body.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(AppError::validation("notes are too long"));
    }
    let date = parse_date(&body.date)?;
    let time_text = body.time.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let time = time_text.map(parse_time_of_day).transpose()?;
    let (category, is_custom_category) =
        next_category(existing, time_text, body.category, body.reset_category)?;
    Ok(MealFields {
        name,
        date,
        time,
        category,
        is_custom_category,
        notes,
    })
}

pub(crate) fn quantity_from(value: f64) -> Result<Decimal, AppError> {
    if !value.is_finite() {
        return Err(AppError::validation("quantity must be a finite number"));
    }
    let q = Decimal::try_from(value).map_err(|_| AppError::validation("quantity is out of range"))?;
    validate_quantity(q)?;
    Ok(q)
}

/// Rejects entries whose unit cannot be converted to the food's serving unit.
fn check_convertible(food: &Food, quantity: Decimal, unit: ServingUnit) -> Result<(), AppError> {
    conversion_factor(quantity, unit, food.serving_size, food.serving_unit).map(|_| ())
}

/// Recomputes the stored aggregates for the given days inside the caller's
/// transaction, so the mutation and its totals commit together.
async fn refresh_days(
    conn: &mut PgConnection,
    user_id: Uuid,
    dates: &[Date],
) -> Result<(), AppError> {
    recompute_days(conn, user_id, dates).await.map_err(|e| {
        warn!(error = %e, %user_id, ?dates, "daily nutrition refresh failed");
        e
    })
}

/// Builds responses with per-entry and per-meal nutrients.
pub async fn meal_details(state: &AppState, meals: Vec<Meal>) -> Result<Vec<MealResponse>, AppError> {
    if meals.is_empty() {
        return Ok(Vec::new());
    }
    let meal_ids: Vec<Uuid> = meals.iter().map(|m| m.id).collect();
    let entries = repo::entries_for_meals(&state.db, &meal_ids).await?;

    let mut food_ids: Vec<Uuid> = entries.iter().map(|e| e.food_id).collect();
    food_ids.sort_unstable();
    food_ids.dedup();
    let foods: HashMap<Uuid, Food> = foods_repo::find_many(&state.db, &food_ids)
        .await?
        .into_iter()
        .map(|f| (f.id, f))
        .collect();

    let mut by_meal: HashMap<Uuid, Vec<FoodEntry>> = HashMap::new();
    for e in entries {
        by_meal.entry(e.meal_id).or_default().push(e);
    }

    meals
        .into_iter()
        .map(|meal| -> Result<MealResponse, AppError> {
            let mut totals = Nutrients::default();
            let mut views = Vec::new();
            for e in by_meal.remove(&meal.id).unwrap_or_default() {
                let food = foods.get(&e.food_id);
                let contribution = entry_contribution(&EntrySnapshot {
                    entry_id: e.id,
                    food_id: e.food_id,
                    quantity: e.quantity,
                    unit: e.unit,
                    food: food.map(Food::nutrients),
                })?;
                totals = totals.checked_add(&contribution).ok_or_else(|| {
                    AppError::validation(format!(
                        "meal {} exceeds the representable nutrient range",
                        meal.id
                    ))
                })?;
                // entry_contribution already failed when the food is missing
                let (food_name, brand) = food
                    .map(|f| (f.name.clone(), f.brand.clone()))
                    .unwrap_or_default();
                views.push(EntryView {
                    id: e.id,
                    food_id: e.food_id,
                    food_name,
                    brand,
                    quantity: present(e.quantity),
                    unit: e.unit,
                    nutrients: contribution.into(),
                });
            }
            Ok(MealResponse::new(meal, views, totals.into()))
        })
        .collect()
}

async fn single_details(state: &AppState, meal: Meal) -> Result<MealResponse, AppError> {
    meal_details(state, vec![meal])
        .await?
        .pop()
        .ok_or(AppError::NotFound("meal"))
}

pub async fn get_meal(state: &AppState, user_id: Uuid, meal_id: Uuid) -> Result<MealResponse, AppError> {
    let meal = repo::find_meal(&state.db, user_id, meal_id).await?;
    single_details(state, meal).await
}

pub async fn create_meal(state: &AppState, user_id: Uuid, body: MealBody) -> Result<MealResponse, AppError> {
    let fields = meal_fields(body, None)?;
    let mut tx = state.db.begin().await?;
    let meal = repo::insert_meal(&mut *tx, user_id, &fields).await?;
    refresh_days(&mut *tx, user_id, &[meal.date]).await?;
    tx.commit().await?;
    info!(
        %user_id,
        meal_id = %meal.id,
        category = meal.category.as_str(),
        custom = meal.is_custom_category,
        "meal created"
    );
    single_details(state, meal).await
}

/// Replaces a meal. Moving it to another date refreshes both days.
pub async fn update_meal(
    state: &AppState,
    user_id: Uuid,
    meal_id: Uuid,
    body: MealBody,
) -> Result<MealResponse, AppError> {
    let mut tx = state.db.begin().await?;
    let existing = repo::lock_meal(&mut *tx, user_id, meal_id).await?;
    let fields = meal_fields(body, Some(&existing))?;
    let meal = repo::update_meal(&mut *tx, user_id, meal_id, &fields).await?;
    refresh_days(&mut *tx, user_id, &[existing.date, meal.date]).await?;
    tx.commit().await?;
    info!(%user_id, %meal_id, category = meal.category.as_str(), "meal updated");
    single_details(state, meal).await
}

pub async fn delete_meal(state: &AppState, user_id: Uuid, meal_id: Uuid) -> Result<(), AppError> {
    let mut tx = state.db.begin().await?;
    let meal = repo::delete_meal(&mut *tx, user_id, meal_id).await?;
    refresh_days(&mut *tx, user_id, &[meal.date]).await?;
    tx.commit().await?;
    info!(%user_id, %meal_id, "meal deleted");
    Ok(())
}

/// Logs a food in a meal. The food is read under a share lock so it cannot
/// change units before the entry commits.
pub async fn add_entry(
    state: &AppState,
    user_id: Uuid,
    meal_id: Uuid,
    body: EntryBody,
) -> Result<MealResponse, AppError> {
    let quantity = quantity_from(body.quantity)?;
    let mut tx = state.db.begin().await?;
    let meal = repo::lock_meal(&mut *tx, user_id, meal_id).await?;
    let food = foods_repo::find_for_share(&mut *tx, body.food_id)
        .await?
        .filter(|f| f.is_visible_to(user_id))
        .ok_or(AppError::NotFound("food"))?;
    check_convertible(&food, quantity, body.unit)?;

    let entry = repo::insert_entry(&mut *tx, meal.id, food.id, quantity, body.unit).await?;
    refresh_days(&mut *tx, user_id, &[meal.date]).await?;
    tx.commit().await?;
    info!(%user_id, %meal_id, entry_id = %entry.id, food_id = %food.id, "food entry added");
    single_details(state, meal).await
}

pub async fn update_entry(
    state: &AppState,
    user_id: Uuid,
    meal_id: Uuid,
    entry_id: Uuid,
    body: EntryUpdateBody,
) -> Result<MealResponse, AppError> {
    let quantity = quantity_from(body.quantity)?;
    let mut tx = state.db.begin().await?;
    let meal = repo::lock_meal(&mut *tx, user_id, meal_id).await?;
    let entry = repo::find_entry(&mut *tx, meal.id, entry_id).await?;
    let food = foods_repo::find_for_share(&mut *tx, entry.food_id)
        .await?
        .ok_or_else(|| {
            AppError::DataIntegrity(format!(
                "food entry {} references missing food {}",
                entry.id, entry.food_id
            ))
        })?;
    check_convertible(&food, quantity, body.unit)?;

    repo::update_entry(&mut *tx, meal.id, entry_id, quantity, body.unit).await?;
    refresh_days(&mut *tx, user_id, &[meal.date]).await?;
    tx.commit().await?;
    info!(%user_id, %meal_id, %entry_id, "food entry updated");
    single_details(state, meal).await
}

pub async fn remove_entry(
    state: &AppState,
    user_id: Uuid,
    meal_id: Uuid,
    entry_id: Uuid,
) -> Result<MealResponse, AppError> {
    let mut tx = state.db.begin().await?;
    let meal = repo::lock_meal(&mut *tx, user_id, meal_id).await?;
    repo::delete_entry(&mut *tx, meal.id, entry_id).await?;
    refresh_days(&mut *tx, user_id, &[meal.date]).await?;
    tx.commit().await?;
    info!(%user_id, %meal_id, %entry_id, "food entry removed");
    single_details(state, meal).await
}

#[cfg(test)]
mod tests {
    use time::{macros::date, OffsetDateTime};

    use super::*;

    fn body(time: Option<&str>, category: Option<MealCategory>) -> MealBody {
        MealBody {
            name: "Oatmeal".into(),
            date: "2024-01-01".into(),
            time: time.map(str::to_string),
            category,
            notes: None,
            reset_category: false,
        }
    }

    fn stored(fields: MealFields) -> Meal {
        let now = OffsetDateTime::now_utc();
        Meal {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: fields.name,
            date: fields.date,
            time: fields.time,
            category: fields.category,
            is_custom_category: fields.is_custom_category,
            notes: fields.notes,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn morning_meal_is_auto_breakfast() {
        let f = meal_fields(body(Some("08:30"), None), None).unwrap();
        assert_eq!(f.category, MealCategory::Breakfast);
        assert!(!f.is_custom_category);
        assert_eq!(f.date, date!(2024 - 01 - 01));
    }

    #[test]
    fn explicit_category_overrides_time() {
        let f = meal_fields(body(Some("08:30"), Some(MealCategory::Dinner)), None).unwrap();
        assert_eq!(f.category, MealCategory::Dinner);
        assert!(f.is_custom_category);
    }

    #[test]
    fn no_time_defaults_to_snack() {
        let f = meal_fields(body(None, None), None).unwrap();
        assert_eq!(f.category, MealCategory::Snack);
        let f = meal_fields(body(Some(""), None), None).unwrap();
        assert_eq!(f.category, MealCategory::Snack);
        assert_eq!(f.time, None);
    }

    #[test]
    fn malformed_time_is_rejected() {
        let err = meal_fields(body(Some("8h30"), None), None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn custom_meal_still_validates_its_time() {
        let meal = stored(
            meal_fields(body(Some("08:30"), Some(MealCategory::Dinner)), None).unwrap(),
        );
        let err = meal_fields(body(Some("24:00"), None), Some(&meal)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn next_category_routes_through_classification() {
        assert_eq!(
            next_category(None, Some("18:30"), None, false).unwrap(),
            (MealCategory::Dinner, false)
        );
        assert!(next_category(None, Some("6pm"), Some(MealCategory::Dinner), false).is_err());
    }

    #[test]
    fn auto_meal_follows_new_time() {
        let meal = stored(meal_fields(body(Some("08:30"), None), None).unwrap());
        let f = meal_fields(body(Some("12:15"), None), Some(&meal)).unwrap();
        assert_eq!(f.category, MealCategory::Lunch);
        assert!(!f.is_custom_category);
    }

    #[test]
    fn custom_meal_keeps_category_until_reset() {
        let meal = stored(
            meal_fields(body(Some("08:30"), Some(MealCategory::Dinner)), None).unwrap(),
        );
        let f = meal_fields(body(Some("12:15"), None), Some(&meal)).unwrap();
        assert_eq!((f.category, f.is_custom_category), (MealCategory::Dinner, true));

        let mut reset = body(Some("12:15"), None);
        reset.reset_category = true;
        let f = meal_fields(reset, Some(&meal)).unwrap();
        assert_eq!((f.category, f.is_custom_category), (MealCategory::Lunch, false));
    }

    #[test]
    fn name_and_date_are_validated() {
        let mut b = body(None, None);
        b.name = "  ".into();
        assert!(meal_fields(b, None).is_err());

        let mut b = body(None, None);
        b.date = "2024-13-01".into();
        assert!(meal_fields(b, None).is_err());
    }

    #[test]
    fn quantities_are_bounded() {
        assert_eq!(quantity_from(150.0).unwrap(), Decimal::from(150));
        assert!(quantity_from(0.0).is_err());
        assert!(quantity_from(-1.0).is_err());
        assert!(quantity_from(f64::NAN).is_err());
        assert!(quantity_from(1e9).is_err());
    }
}
