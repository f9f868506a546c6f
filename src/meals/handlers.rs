use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    meals::{
        dto::{EntryBody, EntryUpdateBody, MealBody, MealListQuery, MealResponse},
        repo, services,
    },
    nutrition::dto::parse_date,
    state::AppState,
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", post(create_meal))
        .route("/meals/:id", put(update_meal).delete(delete_meal))
        .route("/meals/:id/entries", post(add_entry))
        .route(
            "/meals/:id/entries/:entry_id",
            put(update_entry).delete(delete_entry),
        )
}

// --- handlers ---

/// GET /meals?date=YYYY-MM-DD, or the most recent meals without a date.
#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<MealListQuery>,
) -> Result<Json<Vec<MealResponse>>, AppError> {
    let meals = match p.date.as_deref() {
        Some(d) => repo::list_by_date(&state.db, user_id, parse_date(d)?).await?,
        None => {
            repo::list_recent(&state.db, user_id, p.limit.clamp(1, 100), p.offset.max(0)).await?
        }
    };
    Ok(Json(services::meal_details(&state, meals).await?))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MealResponse>, AppError> {
    Ok(Json(services::get_meal(&state, user_id, id).await?))
}

#[instrument(skip(state, body))]
pub async fn create_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<MealBody>,
) -> Result<(StatusCode, HeaderMap, Json<MealResponse>), AppError> {
    let meal = services::create_meal(&state, user_id, body).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/meals/{}", meal.id)) {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(meal)))
}

#[instrument(skip(state, body))]
pub async fn update_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<MealBody>,
) -> Result<Json<MealResponse>, AppError> {
    Ok(Json(services::update_meal(&state, user_id, id, body).await?))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_meal(&state, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn add_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<EntryBody>,
) -> Result<(StatusCode, Json<MealResponse>), AppError> {
    let meal = services::add_entry(&state, user_id, id, body).await?;
    Ok((StatusCode::CREATED, Json(meal)))
}

#[instrument(skip(state, body))]
pub async fn update_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((id, entry_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<EntryUpdateBody>,
) -> Result<Json<MealResponse>, AppError> {
    Ok(Json(
        services::update_entry(&state, user_id, id, entry_id, body).await?,
    ))
}

#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((id, entry_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MealResponse>, AppError> {
    Ok(Json(
        services::remove_entry(&state, user_id, id, entry_id).await?,
    ))
}
