//! Daily nutrition: unit conversion, aggregation and the per-day record.

pub mod aggregator;
pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod store;
pub mod units;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
