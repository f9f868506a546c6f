use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    foods::{
        dto::{ExternalSearchQuery, FoodBody, FoodListQuery, FoodResponse},
        provider::validate_barcode,
        repo,
        repo_types::Food,
        services,
    },
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/foods", get(list_foods).post(create_food))
        .route("/foods/search", get(search_external))
        .route("/foods/barcode/:code", get(get_by_barcode))
        .route("/foods/:id", get(get_food).put(update_food).delete(delete_food))
}

/// Loads a food the caller may see; other users' custom foods look absent.
async fn visible_food(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
) -> Result<Food, AppError> {
    repo::find_by_id(&state.db, id)
        .await?
        .filter(|f| f.is_visible_to(user_id))
        .ok_or(AppError::NotFound("food"))
}

async fn owned_food(state: &AppState, user_id: Uuid, id: Uuid) -> Result<Food, AppError> {
    let food = visible_food(state, user_id, id).await?;
    if !food.is_editable_by(user_id) {
        return Err(AppError::Forbidden("only the creator may modify a custom food".into()));
    }
    Ok(food)
}

#[instrument(skip(state))]
pub async fn list_foods(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<FoodListQuery>,
) -> Result<Json<Vec<FoodResponse>>, AppError> {
    let limit = p.limit.clamp(1, 100);
    let foods = repo::search(&state.db, user_id, &p.q, limit, p.offset.max(0)).await?;
    Ok(Json(
        foods
            .into_iter()
            .map(|f| FoodResponse::for_user(f, user_id))
            .collect(),
    ))
}

#[instrument(skip(state, body))]
pub async fn create_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<FoodBody>,
) -> Result<(StatusCode, Json<FoodResponse>), AppError> {
    let new_food = body.into_new_food(user_id)?;
    let food = repo::insert(&state.db, &new_food).await?;
    info!(%user_id, food_id = %food.id, "custom food created");
    Ok((StatusCode::CREATED, Json(FoodResponse::for_user(food, user_id))))
}

#[instrument(skip(state))]
pub async fn get_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FoodResponse>, AppError> {
    let food = visible_food(&state, user_id, id).await?;
    Ok(Json(FoodResponse::for_user(food, user_id)))
}

#[instrument(skip(state, body))]
pub async fn update_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<FoodBody>,
) -> Result<Json<FoodResponse>, AppError> {
    let food = services::update_food(&state, user_id, id, body).await?;
    Ok(Json(FoodResponse::for_user(food, user_id)))
}

#[instrument(skip(state))]
pub async fn delete_food(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    owned_food(&state, user_id, id).await?;
    repo::delete(&state.db, id).await?;
    info!(%user_id, food_id = %id, "custom food deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Proxies a search to the external provider and caches what comes back.
#[instrument(skip(state))]
pub async fn search_external(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<ExternalSearchQuery>,
) -> Result<Json<Vec<FoodResponse>>, AppError> {
    let q = p.q.trim();
    if q.len() < 2 {
        return Err(AppError::validation("search query must be at least 2 characters"));
    }
    let found = state.food_provider.search(q, p.page).await?;
    let cached = repo::cache_external(&state.db, &found).await?;
    info!(query = q, results = cached.len(), "external food search");
    Ok(Json(
        cached
            .into_iter()
            .map(|f| FoodResponse::for_user(f, user_id))
            .collect(),
    ))
}

#[instrument(skip(state))]
pub async fn get_by_barcode(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<FoodResponse>, AppError> {
    validate_barcode(&code)?;
    let origin = state.food_provider.origin();
    if let Some(food) = repo::find_by_external(&state.db, origin, &code).await? {
        return Ok(Json(FoodResponse::for_user(food, user_id)));
    }
    let found = state
        .food_provider
        .lookup_barcode(&code)
        .await?
        .ok_or(AppError::NotFound("food"))?;
    let mut cached = repo::cache_external(&state.db, std::slice::from_ref(&found)).await?;
    let food = cached.pop().ok_or(AppError::NotFound("food"))?;
    Ok(Json(FoodResponse::for_user(food, user_id)))
}
