use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. The password hash and goals never reach
/// JSON directly; goals go out through `PublicUser`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub calorie_goal: Option<Decimal>,
    #[serde(skip_serializing)]
    pub protein_goal: Option<Decimal>,
    #[serde(skip_serializing)]
    pub carbs_goal: Option<Decimal>,
    #[serde(skip_serializing)]
    pub fat_goal: Option<Decimal>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
