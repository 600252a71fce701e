pub mod affiliates;
pub mod api;
pub mod db;
pub mod docs;
pub mod entitlements;
pub mod models;
pub mod plans;
pub mod research;
pub mod tickets;
pub mod usage;

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub checkout_webhook_key: String,
    pub research_api_key: String,
}
