use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::nutrition::repo_types::{
    DailyNutrition, DailyTotals, DaySnapshot, EntrySnapshot, FoodNutrients, MealSnapshot,
    Nutrients, NutritionGoals,
};
use crate::nutrition::units::ServingUnit;

pub(crate) const DAILY_COLUMNS: &str = r#"
    id, user_id, date, total_calories, total_protein, total_carbs, total_fat,
    total_fiber, total_sugar, total_sodium, calorie_goal, protein_goal,
    carbs_goal, fat_goal, meal_count, created_at, updated_at
"#;

/// Persistence seam of the aggregator.
///
/// Implementors are a unit of work: the Postgres implementation is a
/// connection, normally borrowed from the transaction that also holds the
/// meal or entry mutation, so the mutation and the recomputed aggregate
/// commit or roll back together.
#[async_trait]
pub trait NutritionStore: Send {
    /// Serializes recomputations of (user, date) until the unit of work ends.
    async fn lock_day(&mut self, user_id: Uuid, date: Date) -> Result<(), AppError>;

    /// Goals plus every meal, entry and referenced food for (user, date).
    /// `None` when the user does not exist.
    async fn load_day(&mut self, user_id: Uuid, date: Date) -> Result<Option<DaySnapshot>, AppError>;

    /// Inserts or replaces the aggregate row for (user, date).
    async fn upsert_daily(&mut self, totals: &DailyTotals) -> Result<DailyNutrition, AppError>;
}

#[derive(Debug, FromRow)]
struct EntryRow {
    entry_id: Uuid,
    meal_id: Uuid,
    food_id: Uuid,
    quantity: Decimal,
    unit: ServingUnit,
    found_food_id: Option<Uuid>,
    serving_size: Option<Decimal>,
    serving_unit: Option<ServingUnit>,
    calories: Option<Decimal>,
    protein: Option<Decimal>,
    carbs: Option<Decimal>,
    fat: Option<Decimal>,
    fiber: Option<Decimal>,
    sugar: Option<Decimal>,
    sodium: Option<Decimal>,
}

impl EntryRow {
    fn into_snapshot(self) -> (Uuid, EntrySnapshot) {
        let food = match (self.found_food_id, self.serving_size, self.serving_unit) {
            (Some(food_id), Some(serving_size), Some(serving_unit)) => Some(FoodNutrients {
                food_id,
                serving_size,
                serving_unit,
                per_serving: Nutrients {
                    calories: self.calories.unwrap_or_default(),
                    protein: self.protein.unwrap_or_default(),
                    carbs: self.carbs.unwrap_or_default(),
                    fat: self.fat.unwrap_or_default(),
                    fiber: self.fiber.unwrap_or_default(),
                    sugar: self.sugar.unwrap_or_default(),
                    sodium: self.sodium.unwrap_or_default(),
                },
            }),
            _ => None,
        };
        (
            self.meal_id,
            EntrySnapshot {
                entry_id: self.entry_id,
                food_id: self.food_id,
                quantity: self.quantity,
                unit: self.unit,
                food,
            },
        )
    }
}

#[async_trait]
impl NutritionStore for PgConnection {
    async fn lock_day(&mut self, user_id: Uuid, date: Date) -> Result<(), AppError> {
        // transaction-scoped: a connection outside a transaction releases it at once
        sqlx::query(
            "SELECT pg_advisory_xact_lock(hashtextextended($1::uuid::text || '/' || $2::date::text, 0))",
        )
        .bind(user_id)
        .bind(date)
        .execute(&mut *self)
        .await?;
        Ok(())
    }

    async fn load_day(&mut self, user_id: Uuid, date: Date) -> Result<Option<DaySnapshot>, AppError> {
        let goals = sqlx::query_as::<_, NutritionGoals>(
            r#"
            SELECT calorie_goal, protein_goal, carbs_goal, fat_goal
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self)
        .await?;

        let Some(goals) = goals else {
            return Ok(None);
        };

        let meal_ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM meals
            WHERE user_id = $1 AND date = $2
            ORDER BY time NULLS LAST, created_at
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_all(&mut *self)
        .await?;

        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT e.id AS entry_id, e.meal_id, e.food_id, e.quantity, e.unit,
                   f.id AS found_food_id, f.serving_size, f.serving_unit,
                   f.calories, f.protein, f.carbs, f.fat, f.fiber, f.sugar, f.sodium
            FROM food_entries e
            JOIN meals m ON m.id = e.meal_id
            LEFT JOIN foods f ON f.id = e.food_id
            WHERE m.user_id = $1 AND m.date = $2
            ORDER BY e.created_at
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_all(&mut *self)
        .await?;

        let mut meals: Vec<MealSnapshot> = meal_ids
            .into_iter()
            .map(|(meal_id,)| MealSnapshot {
                meal_id,
                entries: Vec::new(),
            })
            .collect();
        for row in rows {
            let (meal_id, entry) = row.into_snapshot();
            if let Some(meal) = meals.iter_mut().find(|m| m.meal_id == meal_id) {
                meal.entries.push(entry);
            }
        }

        Ok(Some(DaySnapshot { goals, meals }))
    }

    async fn upsert_daily(&mut self, t: &DailyTotals) -> Result<DailyNutrition, AppError> {
        let sql = format!(
            r#"
            INSERT INTO daily_nutrition (
                user_id, date, total_calories, total_protein, total_carbs, total_fat,
                total_fiber, total_sugar, total_sodium, calorie_goal, protein_goal,
                carbs_goal, fat_goal, meal_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_id, date) DO UPDATE SET
                total_calories = EXCLUDED.total_calories,
                total_protein  = EXCLUDED.total_protein,
                total_carbs    = EXCLUDED.total_carbs,
                total_fat      = EXCLUDED.total_fat,
                total_fiber    = EXCLUDED.total_fiber,
                total_sugar    = EXCLUDED.total_sugar,
                total_sodium   = EXCLUDED.total_sodium,
                calorie_goal   = EXCLUDED.calorie_goal,
                protein_goal   = EXCLUDED.protein_goal,
                carbs_goal     = EXCLUDED.carbs_goal,
                fat_goal       = EXCLUDED.fat_goal,
                meal_count     = EXCLUDED.meal_count,
                updated_at     = now()
            RETURNING {DAILY_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, DailyNutrition>(&sql)
            .bind(t.user_id)
            .bind(t.date)
            .bind(t.totals.calories)
            .bind(t.totals.protein)
            .bind(t.totals.carbs)
            .bind(t.totals.fat)
            .bind(t.totals.fiber)
            .bind(t.totals.sugar)
            .bind(t.totals.sodium)
            .bind(t.goals.calorie_goal)
            .bind(t.goals.protein_goal)
            .bind(t.goals.carbs_goal)
            .bind(t.goals.fat_goal)
            .bind(t.meal_count)
            .fetch_one(&mut *self)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use time::OffsetDateTime;

    use super::*;

    #[derive(Default)]
    struct Inner {
        users: HashMap<Uuid, NutritionGoals>,
        foods: HashMap<Uuid, FoodNutrients>,
        meals: Vec<(Uuid, Uuid, Date)>,
        entries: Vec<(Uuid, Uuid, Uuid, Decimal, ServingUnit)>,
        daily: HashMap<(Uuid, Date), DailyNutrition>,
        upserts: usize,
        calls: Vec<&'static str>,
    }

    /// In-process store used by aggregator tests.
    #[derive(Default)]
    pub struct MemoryStore {
        inner: Mutex<Inner>,
    }

    impl MemoryStore {
        pub fn add_user(&self, goals: NutritionGoals) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().users.insert(id, goals);
            id
        }

        pub fn add_food(&self, serving_size: Decimal, unit: ServingUnit, per_serving: Nutrients) -> Uuid {
            let food_id = Uuid::new_v4();
            self.inner.lock().unwrap().foods.insert(
                food_id,
                FoodNutrients {
                    food_id,
                    serving_size,
                    serving_unit: unit,
                    per_serving,
                },
            );
            food_id
        }

        pub fn replace_food(&self, food_id: Uuid, serving_size: Decimal, unit: ServingUnit, per_serving: Nutrients) {
            if let Some(food) = self.inner.lock().unwrap().foods.get_mut(&food_id) {
                food.serving_size = serving_size;
                food.serving_unit = unit;
                food.per_serving = per_serving;
            }
        }

        pub fn remove_food(&self, food_id: Uuid) {
            self.inner.lock().unwrap().foods.remove(&food_id);
        }

        pub fn add_meal(&self, user_id: Uuid, date: Date) -> Uuid {
            let id = Uuid::new_v4();
            self.inner.lock().unwrap().meals.push((id, user_id, date));
            id
        }

        pub fn add_entry(&self, meal_id: Uuid, food_id: Uuid, quantity: Decimal, unit: ServingUnit) -> Uuid {
            let id = Uuid::new_v4();
            self.inner
                .lock()
                .unwrap()
                .entries
                .push((id, meal_id, food_id, quantity, unit));
            id
        }

        pub fn daily(&self, user_id: Uuid, date: Date) -> Option<DailyNutrition> {
            self.inner.lock().unwrap().daily.get(&(user_id, date)).cloned()
        }

        pub fn upserts(&self) -> usize {
            self.inner.lock().unwrap().upserts
        }

        /// Store methods in the order they were called.
        pub fn calls(&self) -> Vec<&'static str> {
            self.inner.lock().unwrap().calls.clone()
        }
    }

    #[async_trait]
    impl NutritionStore for MemoryStore {
        async fn lock_day(&mut self, _user_id: Uuid, _date: Date) -> Result<(), AppError> {
            self.inner.lock().unwrap().calls.push("lock_day");
            Ok(())
        }

        async fn load_day(&mut self, user_id: Uuid, date: Date) -> Result<Option<DaySnapshot>, AppError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push("load_day");
            let Some(goals) = inner.users.get(&user_id).copied() else {
                return Ok(None);
            };
            let meals = inner
                .meals
                .iter()
                .filter(|(_, u, d)| *u == user_id && *d == date)
                .map(|(meal_id, _, _)| MealSnapshot {
                    meal_id: *meal_id,
                    entries: inner
                        .entries
                        .iter()
                        .filter(|e| e.1 == *meal_id)
                        .map(|(entry_id, _, food_id, quantity, unit)| EntrySnapshot {
                            entry_id: *entry_id,
                            food_id: *food_id,
                            quantity: *quantity,
                            unit: *unit,
                            food: inner.foods.get(food_id).copied(),
                        })
                        .collect(),
                })
                .collect();
            Ok(Some(DaySnapshot { goals, meals }))
        }

        async fn upsert_daily(&mut self, t: &DailyTotals) -> Result<DailyNutrition, AppError> {
            let mut inner = self.inner.lock().unwrap();
            inner.upserts += 1;
            inner.calls.push("upsert_daily");
            let now = OffsetDateTime::now_utc();
            let (id, created_at) = inner
                .daily
                .get(&(t.user_id, t.date))
                .map(|row| (row.id, row.created_at))
                .unwrap_or_else(|| (Uuid::new_v4(), now));
            let row = DailyNutrition {
                id,
                user_id: t.user_id,
                date: t.date,
                total_calories: t.totals.calories,
                total_protein: t.totals.protein,
                total_carbs: t.totals.carbs,
                total_fat: t.totals.fat,
                total_fiber: t.totals.fiber,
                total_sugar: t.totals.sugar,
                total_sodium: t.totals.sodium,
                calorie_goal: t.goals.calorie_goal,
                protein_goal: t.goals.protein_goal,
                carbs_goal: t.goals.carbs_goal,
                fat_goal: t.goals.fat_goal,
                meal_count: t.meal_count,
                created_at,
                updated_at: now,
            };
            inner.daily.insert((t.user_id, t.date), row.clone());
            Ok(row)
        }
    }
}
