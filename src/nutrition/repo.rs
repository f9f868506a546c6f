use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::nutrition::repo_types::DailyNutrition;
use crate::nutrition::store::DAILY_COLUMNS;

/// Stored aggregates for a date range, oldest first.
pub async fn list_range(
    db: &PgPool,
    user_id: Uuid,
    start: Date,
    end: Date,
) -> Result<Vec<DailyNutrition>, AppError> {
    let sql = format!(
        r#"
        SELECT {DAILY_COLUMNS}
        FROM daily_nutrition
        WHERE user_id = $1 AND date BETWEEN $2 AND $3
        ORDER BY date ASC
        "#
    );
    let rows = sqlx::query_as::<_, DailyNutrition>(&sql)
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(db)
        .await?;
    Ok(rows)
}
