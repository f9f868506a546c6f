use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::foods::repo_types::{Food, FoodOrigin, NewFood};
use crate::nutrition::units::ServingUnit;

const FOOD_COLUMNS: &str = r#"
    id, name, brand, serving_size, serving_unit, calories, protein, carbs, fat,
    fiber, sugar, sodium, saturated_fat, cholesterol, potassium, source,
    external_id, created_by, created_at
"#;

const INSERT_FOOD: &str = r#"
    INSERT INTO foods (
        name, brand, serving_size, serving_unit, calories, protein, carbs, fat,
        fiber, sugar, sodium, saturated_fat, cholesterol, potassium, source,
        external_id, created_by
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
"#;

fn bind_new_food<'q>(
    q: sqlx::query::QueryAs<'q, Postgres, Food, sqlx::postgres::PgArguments>,
    f: &'q NewFood,
) -> sqlx::query::QueryAs<'q, Postgres, Food, sqlx::postgres::PgArguments> {
    q.bind(&f.name)
        .bind(&f.brand)
        .bind(f.serving_size)
        .bind(f.serving_unit)
        .bind(f.nutrients.calories)
        .bind(f.nutrients.protein)
        .bind(f.nutrients.carbs)
        .bind(f.nutrients.fat)
        .bind(f.nutrients.fiber)
        .bind(f.nutrients.sugar)
        .bind(f.nutrients.sodium)
        .bind(f.saturated_fat)
        .bind(f.cholesterol)
        .bind(f.potassium)
        .bind(f.source)
        .bind(&f.external_id)
        .bind(f.created_by)
}

pub async fn insert(db: &PgPool, food: &NewFood) -> Result<Food, AppError> {
    let sql = format!("{INSERT_FOOD} RETURNING {FOOD_COLUMNS}");
    let row = bind_new_food(sqlx::query_as::<_, Food>(&sql), food)
        .fetch_one(db)
        .await?;
    Ok(row)
}

/// Stores provider results. An already cached (source, external_id) keeps its
/// first copy and is returned unchanged.
pub async fn cache_external(db: &PgPool, foods: &[NewFood]) -> Result<Vec<Food>, AppError> {
    let sql = format!(
        "{INSERT_FOOD} ON CONFLICT (source, external_id) DO UPDATE SET external_id = foods.external_id RETURNING {FOOD_COLUMNS}"
    );
    let mut tx: Transaction<'_, Postgres> = db.begin().await?;
    let mut out = Vec::with_capacity(foods.len());
    for food in foods {
        let row = bind_new_food(sqlx::query_as::<_, Food>(&sql), food)
            .fetch_one(&mut *tx)
            .await?;
        out.push(row);
    }
    tx.commit().await?;
    Ok(out)
}

pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: Uuid) -> Result<Option<Food>, AppError> {
    let row = sqlx::query_as::<_, Food>(&format!("SELECT {FOOD_COLUMNS} FROM foods WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Reads a food and blocks edits to it until the transaction ends.
pub async fn find_for_share<'e>(
    db: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<Food>, AppError> {
    let row = sqlx::query_as::<_, Food>(&format!(
        "SELECT {FOOD_COLUMNS} FROM foods WHERE id = $1 FOR SHARE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Reads a food and blocks new entries for it until the transaction ends.
pub async fn find_for_update<'e>(
    db: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<Food>, AppError> {
    let row = sqlx::query_as::<_, Food>(&format!(
        "SELECT {FOOD_COLUMNS} FROM foods WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Distinct units the food has been logged in.
pub async fn entry_units<'e>(
    db: impl PgExecutor<'e>,
    food_id: Uuid,
) -> Result<Vec<ServingUnit>, AppError> {
    let units = sqlx::query_scalar::<_, ServingUnit>(
        "SELECT DISTINCT unit FROM food_entries WHERE food_id = $1",
    )
    .bind(food_id)
    .fetch_all(db)
    .await?;
    Ok(units)
}

/// Every (user, day) with an entry for the food, ordered by user then date.
pub async fn days_using<'e>(
    db: impl PgExecutor<'e>,
    food_id: Uuid,
) -> Result<Vec<(Uuid, Date)>, AppError> {
    let rows = sqlx::query_as::<_, (Uuid, Date)>(
        r#"
        SELECT DISTINCT m.user_id, m.date
        FROM food_entries e
        JOIN meals m ON m.id = e.meal_id
        WHERE e.food_id = $1
        ORDER BY m.user_id, m.date
        "#,
    )
    .bind(food_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_many<'e>(db: impl PgExecutor<'e>, ids: &[Uuid]) -> Result<Vec<Food>, AppError> {
    let rows = sqlx::query_as::<_, Food>(&format!(
        "SELECT {FOOD_COLUMNS} FROM foods WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find_by_external(
    db: &PgPool,
    source: FoodOrigin,
    external_id: &str,
) -> Result<Option<Food>, AppError> {
    let row = sqlx::query_as::<_, Food>(&format!(
        "SELECT {FOOD_COLUMNS} FROM foods WHERE source = $1 AND external_id = $2"
    ))
    .bind(source)
    .bind(external_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Escapes LIKE wildcards so user input matches literally.
pub(crate) fn like_pattern(q: &str) -> String {
    let escaped = q
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Foods visible to `user_id` whose name contains `q`.
pub async fn search(
    db: &PgPool,
    user_id: Uuid,
    q: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Food>, AppError> {
    let rows = sqlx::query_as::<_, Food>(&format!(
        r#"
        SELECT {FOOD_COLUMNS}
        FROM foods
        WHERE (created_by = $1 OR source <> 'custom')
          AND name ILIKE $2
        ORDER BY (created_by = $1) DESC NULLS LAST, lower(name) ASC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(user_id)
    .bind(like_pattern(q))
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn update<'e>(
    db: impl PgExecutor<'e>,
    id: Uuid,
    food: &NewFood,
) -> Result<Food, AppError> {
    let row = sqlx::query_as::<_, Food>(&format!(
        r#"
        UPDATE foods SET
            name = $2, brand = $3, serving_size = $4, serving_unit = $5,
            calories = $6, protein = $7, carbs = $8, fat = $9, fiber = $10,
            sugar = $11, sodium = $12, saturated_fat = $13, cholesterol = $14,
            potassium = $15
        WHERE id = $1 AND source = 'custom'
        RETURNING {FOOD_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&food.name)
    .bind(&food.brand)
    .bind(food.serving_size)
    .bind(food.serving_unit)
    .bind(food.nutrients.calories)
    .bind(food.nutrients.protein)
    .bind(food.nutrients.carbs)
    .bind(food.nutrients.fat)
    .bind(food.nutrients.fiber)
    .bind(food.nutrients.sugar)
    .bind(food.nutrients.sodium)
    .bind(food.saturated_fat)
    .bind(food.cholesterol)
    .bind(food.potassium)
    .fetch_optional(db)
    .await?;
    row.ok_or(AppError::NotFound("food"))
}

/// Deletes a food. Foods still used by entries are a conflict.
pub async fn delete(db: &PgPool, id: Uuid) -> Result<(), AppError> {
    let res = sqlx::query("DELETE FROM foods WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::DataIntegrity(_) => {
                AppError::Conflict("food is still used by meal entries".into())
            }
            other => other,
        })?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("food"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("apple"), "%apple%");
        assert_eq!(like_pattern(" 100% juice "), "%100\\% juice%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }
}
