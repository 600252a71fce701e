// src/models.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Serialize, FromRow)]
pub struct Subscription {
    pub id: i32,
    pub user_id: i32,
    pub plan_tier: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct Affiliate {
    pub id: i32,
    pub user_id: Option<i32>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub has_social_following: Option<bool>,
    pub social_handle: Option<String>,
    pub paypal_email: Option<String>,
    pub code: String,
    pub status: String, // pending | approved | rejected
    pub total_earnings_cents: i64,
    pub pending_earnings_cents: i64,
    pub paid_earnings_cents: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct Payout {
    pub id: i32,
    pub affiliate_id: i32,
    pub amount_cents: i64,
    pub status: String, // pending | completed | rejected
    pub notes: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct Ticket {
    pub id: i32,
    pub user_id: i32,
    pub subject: String,
    pub status: String, // open | closed
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct TicketMessage {
    pub id: i32,
    pub ticket_id: i32,
    pub author_id: i32,
    pub from_admin: bool,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct UserRecord {
    pub id: i32,
    pub username: Option<String>,
    pub email: String,
    pub role: String, // user | admin
    pub deactivated: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}
