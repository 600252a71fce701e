// src/db.rs

use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use std::fmt;

use crate::models::{Subscription, UserRecord};
use crate::plans::{PlanTier, UnknownTier};

/// Soft-deleted accounts keep their data this long before purge.
pub const DEACTIVATION_GRACE_DAYS: i64 = 7;

#[derive(Debug)]
pub enum PlanResolveError {
    Db(sqlx::Error),
    UnknownTier(UnknownTier),
}

impl fmt::Display for PlanResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanResolveError::Db(e) => write!(f, "database error: {e}"),
            PlanResolveError::UnknownTier(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PlanResolveError {}

impl From<sqlx::Error> for PlanResolveError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(value)
    }
}

/// The subscription that grants entitlements right now.
/// `status = 'canceled'` still counts until the paid period runs out.
pub async fn get_effective_subscription(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(
        r#"SELECT * FROM subscriptions
           WHERE user_id = $1
             AND status IN ('active', 'canceled')
             AND (current_period_end IS NULL OR current_period_end > NOW())
           ORDER BY created_at DESC
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Plan tier the user is entitled to: the effective subscription's tier, or
/// free without one. A tier string the catalog does not know is an error so
/// a billing misconfiguration cannot masquerade as the free plan.
pub async fn resolve_plan_tier(pool: &PgPool, user_id: i32) -> Result<PlanTier, PlanResolveError> {
    match get_effective_subscription(pool, user_id).await? {
        Some(sub) => PlanTier::parse(&sub.plan_tier).map_err(PlanResolveError::UnknownTier),
        None => Ok(PlanTier::Free),
    }
}

pub async fn get_user(pool: &PgPool, user_id: i32) -> Result<Option<UserRecord>, sqlx::Error> {
    sqlx::query_as::<_, UserRecord>(
        r#"SELECT id, username, email, role, deactivated, deactivated_at, created_at
           FROM users WHERE id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_users(pool: &PgPool) -> Result<Vec<UserRecord>, sqlx::Error> {
    sqlx::query_as::<_, UserRecord>(
        r#"SELECT id, username, email, role, deactivated, deactivated_at, created_at
           FROM users ORDER BY created_at DESC"#,
    )
    .fetch_all(pool)
    .await
}

/// Soft delete: flags the account and schedules the purge, nothing is
/// removed here.
pub async fn deactivate_user(pool: &PgPool, user_id: i32) -> Result<bool, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"UPDATE users
           SET deactivated = TRUE, deactivated_at = $1, purge_after = $2
           WHERE id = $3 AND deactivated = FALSE"#,
    )
    .bind(now)
    .bind(now + Duration::days(DEACTIVATION_GRACE_DAYS))
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn reactivate_user(pool: &PgPool, user_id: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE users
           SET deactivated = FALSE, deactivated_at = NULL, purge_after = NULL
           WHERE id = $1 AND deactivated = TRUE"#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(Debug)]
pub enum NewsletterError {
    InvalidEmail,
    Duplicate,
    Db(sqlx::Error),
}

impl fmt::Display for NewsletterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewsletterError::InvalidEmail => write!(f, "invalid email"),
            NewsletterError::Duplicate => write!(f, "email is already subscribed"),
            NewsletterError::Db(e) => write!(f, "database error: {e}"),
        }
    }
}

impl From<sqlx::Error> for NewsletterError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(value)
    }
}

/// Duplicate prevention rides on the unique constraint; the insert either
/// lands or reports ON CONFLICT DO NOTHING as zero rows.
pub async fn subscribe_newsletter(pool: &PgPool, email: &str) -> Result<(), NewsletterError> {
    let email = email.trim().to_lowercase();
    if !crate::affiliates::email_looks_valid(&email) {
        return Err(NewsletterError::InvalidEmail);
    }

    let result = sqlx::query(
        r#"INSERT INTO newsletter_subscribers (email)
           VALUES ($1)
           ON CONFLICT (email) DO NOTHING"#,
    )
    .bind(&email)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(NewsletterError::Duplicate);
    }

    Ok(())
}

pub async fn user_email(pool: &PgPool, user_id: i32) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("email")))
}
