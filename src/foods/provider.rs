//! External nutrition database used by the food search proxy.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::FoodApiConfig;
use crate::error::AppError;
use crate::foods::repo_types::{FoodOrigin, NewFood};
use crate::nutrition::repo_types::Nutrients;
use crate::nutrition::units::{ServingUnit, MAX_NUTRIENT_AMOUNT};

pub const SEARCH_PAGE_SIZE: u32 = 20;

#[async_trait]
pub trait FoodProvider: Send + Sync {
    fn origin(&self) -> FoodOrigin;

    async fn search(&self, query: &str, page: u32) -> Result<Vec<NewFood>, AppError>;

    async fn lookup_barcode(&self, barcode: &str) -> Result<Option<NewFood>, AppError>;
}

pub fn validate_barcode(code: &str) -> Result<(), AppError> {
    if !(8..=14).contains(&code.len()) || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation(format!("invalid barcode '{code}'")));
    }
    Ok(())
}

#[derive(Clone)]
pub struct OpenFoodFacts {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    status: i64,
    product: Option<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    code: Option<String>,
    product_name: Option<String>,
    brands: Option<String>,
    #[serde(default)]
    nutriments: HashMap<String, Value>,
}

fn within_bounds(v: Decimal) -> Option<Decimal> {
    (v <= Decimal::from(MAX_NUTRIENT_AMOUNT)).then_some(v)
}

/// Nutriment values arrive as numbers or numeric strings. Implausible ones
/// are dropped.
fn nutriment(map: &HashMap<String, Value>, key: &str) -> Option<Decimal> {
    let v = match map.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !v.is_finite() || v < 0.0 {
        return None;
    }
    Decimal::try_from(v).ok().and_then(within_bounds)
}

fn grams_to_mg(v: Decimal) -> Option<Decimal> {
    v.checked_mul(Decimal::ONE_THOUSAND).and_then(within_bounds)
}

impl Product {
    /// Per-100 g food, or `None` when the product lacks a name, barcode or energy.
    fn into_new_food(self) -> Option<NewFood> {
        let code = self.code.filter(|c| !c.trim().is_empty())?;
        let name = self
            .product_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())?;
        let n = &self.nutriments;
        let calories = nutriment(n, "energy-kcal_100g")?;
        let zero = || Decimal::ZERO;
        Some(NewFood {
            name,
            brand: self
                .brands
                .and_then(|b| b.split(',').next().map(|s| s.trim().to_string()))
                .filter(|b| !b.is_empty()),
            serving_size: Decimal::ONE_HUNDRED,
            serving_unit: ServingUnit::G,
            nutrients: Nutrients {
                calories,
                protein: nutriment(n, "proteins_100g").unwrap_or_else(zero),
                carbs: nutriment(n, "carbohydrates_100g").unwrap_or_else(zero),
                fat: nutriment(n, "fat_100g").unwrap_or_else(zero),
                fiber: nutriment(n, "fiber_100g").unwrap_or_else(zero),
                sugar: nutriment(n, "sugars_100g").unwrap_or_else(zero),
                sodium: nutriment(n, "sodium_100g").and_then(grams_to_mg).unwrap_or_else(zero),
            },
            saturated_fat: nutriment(n, "saturated-fat_100g"),
            cholesterol: nutriment(n, "cholesterol_100g").and_then(grams_to_mg),
            potassium: nutriment(n, "potassium_100g").and_then(grams_to_mg),
            source: FoodOrigin::OpenFoodFacts,
            external_id: Some(code),
            created_by: None,
        })
    }
}

impl OpenFoodFacts {
    pub fn new(cfg: &FoodApiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FoodProvider for OpenFoodFacts {
    fn origin(&self) -> FoodOrigin {
        FoodOrigin::OpenFoodFacts
    }

    async fn search(&self, query: &str, page: u32) -> Result<Vec<NewFood>, AppError> {
        let page = page.max(1).to_string();
        let page_size = SEARCH_PAGE_SIZE.to_string();
        let res = self
            .client
            .get(format!("{}/cgi/search.pl", self.base_url))
            .query(&[
                ("search_terms", query),
                ("search_simple", "1"),
                ("json", "1"),
                ("page", page.as_str()),
                ("page_size", page_size.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: SearchResponse = res.json().await?;
        let total = body.products.len();
        let foods: Vec<NewFood> = body
            .products
            .into_iter()
            .filter_map(Product::into_new_food)
            .collect();
        debug!(query, total, usable = foods.len(), "food provider search");
        Ok(foods)
    }

    async fn lookup_barcode(&self, barcode: &str) -> Result<Option<NewFood>, AppError> {
        validate_barcode(barcode)?;
        let res = self
            .client
            .get(format!("{}/api/v0/product/{}.json", self.base_url, barcode))
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ProductResponse = res.error_for_status()?.json().await?;
        if body.status != 1 {
            return Ok(None);
        }
        let food = body.product.and_then(Product::into_new_food);
        if food.is_none() {
            warn!(barcode, "provider product lacks usable nutrition data");
        }
        Ok(food)
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::Path, routing::get, Json, Router};
    use serde_json::json;

    use super::*;

    fn product_json() -> Value {
        json!({
            "code": "5449000000996",
            "product_name": "Cola",
            "brands": "Coca-Cola, The Coca-Cola Company",
            "nutriments": {
                "energy-kcal_100g": 42,
                "carbohydrates_100g": "10.6",
                "sugars_100g": 10.6,
                "sodium_100g": 0.004
            }
        })
    }

    #[test]
    fn product_maps_to_per_100g_food() {
        let p: Product = serde_json::from_value(product_json()).unwrap();
        let food = p.into_new_food().unwrap();
        assert_eq!(food.name, "Cola");
        assert_eq!(food.brand.as_deref(), Some("Coca-Cola"));
        assert_eq!(food.serving_size, Decimal::ONE_HUNDRED);
        assert_eq!(food.serving_unit, ServingUnit::G);
        assert_eq!(food.nutrients.calories, Decimal::from(42));
        assert_eq!(food.nutrients.carbs, Decimal::new(106, 1));
        assert_eq!(food.nutrients.sodium, Decimal::from(4));
        assert_eq!(food.nutrients.protein, Decimal::ZERO);
        assert_eq!(food.external_id.as_deref(), Some("5449000000996"));
        assert_eq!(food.source, FoodOrigin::OpenFoodFacts);
        assert_eq!(food.created_by, None);
    }

    #[test]
    fn products_without_energy_or_name_are_skipped() {
        let mut v = product_json();
        v["nutriments"] = json!({ "fat_100g": 1 });
        let p: Product = serde_json::from_value(v).unwrap();
        assert!(p.into_new_food().is_none());

        let mut v = product_json();
        v["product_name"] = json!("  ");
        let p: Product = serde_json::from_value(v).unwrap();
        assert!(p.into_new_food().is_none());
    }

    #[test]
    fn implausible_nutriments_are_dropped() {
        let mut v = product_json();
        v["nutriments"]["sodium_100g"] = json!(1e30);
        v["nutriments"]["fat_100g"] = json!(5e6);
        let food = serde_json::from_value::<Product>(v).unwrap().into_new_food().unwrap();
        assert_eq!(food.nutrients.sodium, Decimal::ZERO);
        assert_eq!(food.nutrients.fat, Decimal::ZERO);

        let mut v = product_json();
        v["nutriments"]["energy-kcal_100g"] = json!(1e20);
        let p: Product = serde_json::from_value(v).unwrap();
        assert!(p.into_new_food().is_none());
    }

    #[test]
    fn barcode_validation() {
        assert!(validate_barcode("5449000000996").is_ok());
        assert!(validate_barcode("1234567").is_err());
        assert!(validate_barcode("12345678a").is_err());
    }

    async fn spawn_fake_provider() -> String {
        let app = Router::new()
            .route(
                "/cgi/search.pl",
                get(|| async {
                    Json(json!({
                        "products": [
                            product_json(),
                            { "code": "1", "product_name": "No energy", "nutriments": {} }
                        ]
                    }))
                }),
            )
            .route(
                "/api/v0/product/:file",
                get(|Path(file): Path<String>| async move {
                    if file == "5449000000996.json" {
                        Json(json!({ "status": 1, "product": product_json() }))
                    } else {
                        Json(json!({ "status": 0 }))
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider(base_url: String) -> OpenFoodFacts {
        OpenFoodFacts::new(&FoodApiConfig {
            base_url,
            timeout_secs: 5,
            user_agent: "food-tracker-tests".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn search_keeps_usable_products() {
        let off = provider(spawn_fake_provider().await);
        let foods = off.search("cola", 1).await.unwrap();
        assert_eq!(foods.len(), 1);
        assert_eq!(foods[0].name, "Cola");
    }

    #[tokio::test]
    async fn barcode_lookup_hits_and_misses() {
        let off = provider(spawn_fake_provider().await);
        let hit = off.lookup_barcode("5449000000996").await.unwrap();
        assert_eq!(hit.unwrap().nutrients.calories, Decimal::from(42));
        let miss = off.lookup_barcode("00000000").await.unwrap();
        assert!(miss.is_none());
    }
}
