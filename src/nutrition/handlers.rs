use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use time::Date;
use tracing::instrument;

use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    nutrition::{
        aggregator::recompute_daily,
        dto::{parse_date, CalendarQuery, DailyNutritionResponse},
        repo,
    },
    state::AppState,
};

pub const MAX_CALENDAR_DAYS: i64 = 92;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/nutrition/daily/:date", get(get_daily))
        .route("/nutrition/calendar", get(get_calendar))
}

fn calendar_range(q: &CalendarQuery) -> Result<(Date, Date), AppError> {
    let start = parse_date(&q.start)?;
    let end = parse_date(&q.end)?;
    if start > end {
        return Err(AppError::validation("start must not be after end"));
    }
    if (end - start).whole_days() >= MAX_CALENDAR_DAYS {
        return Err(AppError::validation(format!(
            "range may span at most {MAX_CALENDAR_DAYS} days"
        )));
    }
    Ok((start, end))
}

/// GET /nutrition/daily/:date, recomputed from the current meals.
#[instrument(skip(state))]
pub async fn get_daily(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(date): Path<String>,
) -> Result<Json<DailyNutritionResponse>, AppError> {
    let date = parse_date(&date)?;
    let mut tx = state.db.begin().await?;
    let record = recompute_daily(&mut *tx, user_id, date).await?;
    tx.commit().await?;
    Ok(Json(record.into()))
}

/// GET /nutrition/calendar?start=&end=. Days without a stored aggregate are omitted.
#[instrument(skip(state))]
pub async fn get_calendar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<CalendarQuery>,
) -> Result<Json<Vec<DailyNutritionResponse>>, AppError> {
    let (start, end) = calendar_range(&q)?;
    let rows = repo::list_range(&state.db, user_id, start, end).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(start: &str, end: &str) -> CalendarQuery {
        CalendarQuery {
            start: start.into(),
            end: end.into(),
        }
    }

    #[test]
    fn calendar_range_bounds() {
        assert!(calendar_range(&q("2024-01-01", "2024-01-01")).is_ok());
        // 92 days inclusive
        assert!(calendar_range(&q("2024-01-01", "2024-04-01")).is_ok());
        assert!(calendar_range(&q("2024-01-01", "2024-04-02")).is_err());
        assert!(calendar_range(&q("2024-02-01", "2024-01-31")).is_err());
        assert!(calendar_range(&q("2024-01-01", "soon")).is_err());
    }
}
