use rust_decimal::Decimal;
use sqlx::PgExecutor;
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::meals::repo_types::{FoodEntry, Meal, MealFields};
use crate::nutrition::units::ServingUnit;

const MEAL_COLUMNS: &str =
    "id, user_id, name, date, time, category, is_custom_category, notes, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, meal_id, food_id, quantity, unit, created_at";

pub async fn insert_meal<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    m: &MealFields,
) -> Result<Meal, AppError> {
    let row = sqlx::query_as::<_, Meal>(&format!(
        r#"
        INSERT INTO meals (user_id, name, date, time, category, is_custom_category, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {MEAL_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(&m.name)
    .bind(m.date)
    .bind(m.time)
    .bind(m.category)
    .bind(m.is_custom_category)
    .bind(&m.notes)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn update_meal<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    meal_id: Uuid,
    m: &MealFields,
) -> Result<Meal, AppError> {
    let row = sqlx::query_as::<_, Meal>(&format!(
        r#"
        UPDATE meals SET
            name = $3, date = $4, time = $5, category = $6,
            is_custom_category = $7, notes = $8, updated_at = now()
        WHERE id = $1 AND user_id = $2
        RETURNING {MEAL_COLUMNS}
        "#
    ))
    .bind(meal_id)
    .bind(user_id)
    .bind(&m.name)
    .bind(m.date)
    .bind(m.time)
    .bind(m.category)
    .bind(m.is_custom_category)
    .bind(&m.notes)
    .fetch_optional(db)
    .await?;
    row.ok_or(AppError::NotFound("meal"))
}

/// Deletes a meal and, through the foreign key, its entries.
pub async fn delete_meal<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    meal_id: Uuid,
) -> Result<Meal, AppError> {
    let row = sqlx::query_as::<_, Meal>(&format!(
        "DELETE FROM meals WHERE id = $1 AND user_id = $2 RETURNING {MEAL_COLUMNS}"
    ))
    .bind(meal_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    row.ok_or(AppError::NotFound("meal"))
}

pub async fn find_meal<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    meal_id: Uuid,
) -> Result<Meal, AppError> {
    let row = sqlx::query_as::<_, Meal>(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1 AND user_id = $2"
    ))
    .bind(meal_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    row.ok_or(AppError::NotFound("meal"))
}

/// Like `find_meal`, but keeps the row locked until the transaction ends so
/// its date cannot move underneath a recompute.
pub async fn lock_meal<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    meal_id: Uuid,
) -> Result<Meal, AppError> {
    let row = sqlx::query_as::<_, Meal>(&format!(
        "SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1 AND user_id = $2 FOR UPDATE"
    ))
    .bind(meal_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    row.ok_or(AppError::NotFound("meal"))
}

pub async fn list_by_date<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    date: Date,
) -> Result<Vec<Meal>, AppError> {
    let rows = sqlx::query_as::<_, Meal>(&format!(
        r#"
        SELECT {MEAL_COLUMNS}
        FROM meals
        WHERE user_id = $1 AND date = $2
        ORDER BY time NULLS LAST, created_at
        "#
    ))
    .bind(user_id)
    .bind(date)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_recent<'e>(
    db: impl PgExecutor<'e>,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Meal>, AppError> {
    let rows = sqlx::query_as::<_, Meal>(&format!(
        r#"
        SELECT {MEAL_COLUMNS}
        FROM meals
        WHERE user_id = $1
        ORDER BY date DESC, time DESC NULLS LAST, created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn entries_for_meals<'e>(
    db: impl PgExecutor<'e>,
    meal_ids: &[Uuid],
) -> Result<Vec<FoodEntry>, AppError> {
    let rows = sqlx::query_as::<_, FoodEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM food_entries WHERE meal_id = ANY($1) ORDER BY created_at"
    ))
    .bind(meal_ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn insert_entry<'e>(
    db: impl PgExecutor<'e>,
    meal_id: Uuid,
    food_id: Uuid,
    quantity: Decimal,
    unit: ServingUnit,
) -> Result<FoodEntry, AppError> {
    let row = sqlx::query_as::<_, FoodEntry>(&format!(
        r#"
        INSERT INTO food_entries (meal_id, food_id, quantity, unit)
        VALUES ($1, $2, $3, $4)
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(meal_id)
    .bind(food_id)
    .bind(quantity)
    .bind(unit)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn find_entry<'e>(
    db: impl PgExecutor<'e>,
    meal_id: Uuid,
    entry_id: Uuid,
) -> Result<FoodEntry, AppError> {
    let row = sqlx::query_as::<_, FoodEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM food_entries WHERE id = $1 AND meal_id = $2"
    ))
    .bind(entry_id)
    .bind(meal_id)
    .fetch_optional(db)
    .await?;
    row.ok_or(AppError::NotFound("food entry"))
}

pub async fn update_entry<'e>(
    db: impl PgExecutor<'e>,
    meal_id: Uuid,
    entry_id: Uuid,
    quantity: Decimal,
    unit: ServingUnit,
) -> Result<FoodEntry, AppError> {
    let row = sqlx::query_as::<_, FoodEntry>(&format!(
        r#"
        UPDATE food_entries SET quantity = $3, unit = $4
        WHERE id = $1 AND meal_id = $2
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(entry_id)
    .bind(meal_id)
    .bind(quantity)
    .bind(unit)
    .fetch_optional(db)
    .await?;
    row.ok_or(AppError::NotFound("food entry"))
}

pub async fn delete_entry<'e>(
    db: impl PgExecutor<'e>,
    meal_id: Uuid,
    entry_id: Uuid,
) -> Result<(), AppError> {
    let res = sqlx::query("DELETE FROM food_entries WHERE id = $1 AND meal_id = $2")
        .bind(entry_id)
        .bind(meal_id)
        .execute(db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("food entry"));
    }
    Ok(())
}
