pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod foods;
pub mod meals;
pub mod nutrition;
pub mod state;
