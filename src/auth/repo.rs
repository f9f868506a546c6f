use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::nutrition::repo_types::NutritionGoals;

const USER_COLUMNS: &str =
    "id, email, password_hash, calorie_goal, protein_goal, carbs_goal, fat_goal, created_at";

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Create a new user with hashed password.
    pub async fn create(db: &PgPool, email: &str, password_hash: &str) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    pub async fn update_goals(
        db: &PgPool,
        id: Uuid,
        goals: &NutritionGoals,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET calorie_goal = $2, protein_goal = $3, carbs_goal = $4, fat_goal = $5
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(goals.calorie_goal)
        .bind(goals.protein_goal)
        .bind(goals.carbs_goal)
        .bind(goals.fat_goal)
        .fetch_optional(db)
        .await
    }
}
