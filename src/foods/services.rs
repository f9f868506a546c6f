//! Edits to custom foods that are already logged.
//!
//! Entries store a quantity and a unit, not nutrients, so changing a food
//! changes every day it was eaten on. The edit and the recomputation of those
//! days commit together.

use std::collections::BTreeMap;

use time::Date;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    foods::{dto::FoodBody, repo, repo_types::Food},
    nutrition::{
        aggregator::recompute_days,
        store::NutritionStore,
        units::{is_convertible, ServingUnit},
    },
    state::AppState,
};

/// Rejects a serving unit that some logged entries could not be scaled against.
pub fn check_logged_units(logged: &[ServingUnit], serving_unit: ServingUnit) -> Result<(), AppError> {
    let mut stranded: Vec<&str> = logged
        .iter()
        .filter(|unit| !is_convertible(**unit, serving_unit))
        .map(|unit| unit.as_str())
        .collect();
    if stranded.is_empty() {
        return Ok(());
    }
    stranded.sort_unstable();
    stranded.dedup();
    Err(AppError::Conflict(format!(
        "food is logged in {} which cannot be converted to {serving_unit}",
        stranded.join(", ")
    )))
}

/// Recomputes every (user, day) pair, one user at a time with dates ascending.
pub async fn refresh_days_using<S>(store: &mut S, days: &[(Uuid, Date)]) -> Result<(), AppError>
where
    S: NutritionStore + ?Sized,
{
    let mut by_user: BTreeMap<Uuid, Vec<Date>> = BTreeMap::new();
    for (user_id, date) in days {
        by_user.entry(*user_id).or_default().push(*date);
    }
    for (user_id, dates) in by_user {
        recompute_days(&mut *store, user_id, &dates).await?;
    }
    Ok(())
}

/// Replaces a custom food and refreshes the days that log it.
///
/// The food row stays locked until commit, so no entry for it can be added
/// between the unit check and the recompute.
pub async fn update_food(
    state: &AppState,
    user_id: Uuid,
    food_id: Uuid,
    body: FoodBody,
) -> Result<Food, AppError> {
    let mut tx = state.db.begin().await?;
    let current = repo::find_for_update(&mut *tx, food_id)
        .await?
        .filter(|f| f.is_visible_to(user_id))
        .ok_or(AppError::NotFound("food"))?;
    if !current.is_editable_by(user_id) {
        return Err(AppError::Forbidden("only the creator may modify a custom food".into()));
    }
    let new_food = body.into_new_food(user_id)?;

    if new_food.serving_unit != current.serving_unit {
        let logged = repo::entry_units(&mut *tx, food_id).await?;
        check_logged_units(&logged, new_food.serving_unit)?;
    }

    let food = repo::update(&mut *tx, food_id, &new_food).await?;
    let days = repo::days_using(&mut *tx, food_id).await?;
    refresh_days_using(&mut *tx, &days).await?;
    tx.commit().await?;

    info!(%user_id, %food_id, days = days.len(), "custom food updated");
    Ok(food)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use time::macros::date;

    use super::*;
    use crate::nutrition::repo_types::{NutritionGoals, Nutrients};
    use crate::nutrition::store::memory::MemoryStore;

    fn kcal(v: i64) -> Nutrients {
        Nutrients {
            calories: Decimal::from(v),
            ..Default::default()
        }
    }

    #[test]
    fn unit_class_change_is_refused_while_logged() {
        use ServingUnit::*;
        assert!(check_logged_units(&[], Piece).is_ok());
        assert!(check_logged_units(&[G, Kg, Ml], Cup).is_ok());
        assert!(check_logged_units(&[Slice], Slice).is_ok());

        let err = check_logged_units(&[G, Cup], Piece).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            err.to_string(),
            "conflict: food is logged in cup, g which cannot be converted to piece"
        );
        assert!(matches!(
            check_logged_units(&[Piece], G),
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn edited_food_flows_into_every_logged_day() {
        let mut store = MemoryStore::default();
        let (alice, bob) = (
            store.add_user(NutritionGoals::default()),
            store.add_user(NutritionGoals::default()),
        );
        let (mon, tue) = (date!(2024 - 03 - 04), date!(2024 - 03 - 05));
        let bread = store.add_food(Decimal::from(50), ServingUnit::G, kcal(130));
        for (user, day) in [(alice, mon), (alice, tue), (bob, tue)] {
            let meal = store.add_meal(user, day);
            store.add_entry(meal, bread, Decimal::from(100), ServingUnit::G);
        }
        let days = [(alice, mon), (alice, tue), (bob, tue)];
        refresh_days_using(&mut store, &days).await.unwrap();
        assert_eq!(store.daily(alice, mon).unwrap().total_calories, Decimal::from(260));

        store.replace_food(bread, Decimal::from(100), ServingUnit::G, kcal(250));
        refresh_days_using(&mut store, &days).await.unwrap();
        for (user, day) in days {
            assert_eq!(store.daily(user, day).unwrap().total_calories, Decimal::from(250));
        }
        assert_eq!(store.upserts(), 6);
    }

    #[tokio::test]
    async fn failing_day_stops_the_refresh() {
        let mut store = MemoryStore::default();
        let user = store.add_user(NutritionGoals::default());
        let day = date!(2024 - 03 - 06);
        let cereal = store.add_food(Decimal::from(30), ServingUnit::G, kcal(110));
        let meal = store.add_meal(user, day);
        store.add_entry(meal, cereal, Decimal::from(2), ServingUnit::Piece);

        let err = refresh_days_using(&mut store, &[(user, day)]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.daily(user, day).is_none());
    }
}
