// src/affiliates.rs
//
// Affiliate program: public applications, referral/conversion tracking, and
// the payout state machine.
//
// Money is integer cents. The earnings invariant on every affiliate row is
// total_earnings_cents == pending_earnings_cents + paid_earnings_cents.
// Creating a payout never debits pending; completion is the single move from
// pending to paid, and rejection leaves the balance where it already was.
// Both transitions run in one transaction with the rows locked.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::fmt;
use uuid::Uuid;

use crate::models::{Affiliate, Payout};

/// Commission rate for conversions, in basis points (20%).
pub const COMMISSION_RATE_BPS: i64 = 2000;

#[derive(Debug)]
pub enum AffiliateError {
    Validation(String),
    Duplicate(String),
    NotFound,
    InvalidState(String),
    Db(sqlx::Error),
}

impl fmt::Display for AffiliateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffiliateError::Validation(msg) => write!(f, "{msg}"),
            AffiliateError::Duplicate(msg) => write!(f, "{msg}"),
            AffiliateError::NotFound => write!(f, "not found"),
            AffiliateError::InvalidState(msg) => write!(f, "{msg}"),
            AffiliateError::Db(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for AffiliateError {}

impl From<sqlx::Error> for AffiliateError {
    fn from(value: sqlx::Error) -> Self {
        Self::Db(value)
    }
}

fn unique_violation_constraint(e: &sqlx::Error) -> Option<&str> {
    match e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => db.constraint(),
        _ => None,
    }
}

/// The `affiliates` table has two unique constraints; only a collision on
/// the generated code is retryable.
fn is_code_conflict(constraint: &str) -> bool {
    constraint.ends_with("_code_key")
}

pub fn commission_for(amount_cents: i64) -> i64 {
    amount_cents * COMMISSION_RATE_BPS / 10_000
}

/// Same quick shape check the login path uses for buyer emails.
pub fn email_looks_valid(email: &str) -> bool {
    let email = email.trim();
    email.contains('@') && email.contains('.') && !email.starts_with('@') && !email.ends_with('.')
}

#[derive(Debug)]
pub struct NewApplication {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub has_social_following: Option<bool>,
    pub social_handle: Option<String>,
    pub paypal_email: Option<String>,
    pub user_id: Option<i32>,
}

pub fn validate_application(app: &NewApplication) -> Result<(), AffiliateError> {
    if !email_looks_valid(&app.email) {
        return Err(AffiliateError::Validation("invalid email".to_string()));
    }
    if app.first_name.trim().is_empty() || app.last_name.trim().is_empty() {
        return Err(AffiliateError::Validation(
            "first and last name are required".to_string(),
        ));
    }
    if let Some(paypal) = app.paypal_email.as_deref() {
        if !email_looks_valid(paypal) {
            return Err(AffiliateError::Validation(
                "invalid paypal email".to_string(),
            ));
        }
    }
    Ok(())
}

fn generate_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Persists a pending application. A second application for the same email
/// is a business rejection; the unique constraint on email closes the race
/// the pre-insert check leaves open.
pub async fn create_public_application(
    pool: &PgPool,
    app: NewApplication,
) -> Result<Affiliate, AffiliateError> {
    validate_application(&app)?;

    let email = app.email.trim().to_lowercase();

    let existing = sqlx::query("SELECT id FROM affiliates WHERE email = $1")
        .bind(&email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(AffiliateError::Duplicate(
            "an application for this email already exists".to_string(),
        ));
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = sqlx::query_as::<_, Affiliate>(
            r#"INSERT INTO affiliates
                   (user_id, email, first_name, last_name, date_of_birth,
                    has_social_following, social_handle, paypal_email, code, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
               RETURNING *"#,
        )
        .bind(app.user_id)
        .bind(&email)
        .bind(app.first_name.trim())
        .bind(app.last_name.trim())
        .bind(app.date_of_birth)
        .bind(app.has_social_following)
        .bind(app.social_handle.as_deref())
        .bind(app.paypal_email.as_deref())
        .bind(generate_code())
        .fetch_one(pool)
        .await;

        match result {
            Ok(affiliate) => return Ok(affiliate),
            Err(e) => {
                let code_conflict = unique_violation_constraint(&e).map(is_code_conflict);
                match code_conflict {
                    Some(true) if attempts < 3 => continue,
                    Some(false) => {
                        return Err(AffiliateError::Duplicate(
                            "an application for this email already exists".to_string(),
                        ))
                    }
                    _ => return Err(e.into()),
                }
            }
        }
    }
}

pub async fn affiliate_for_user(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<Affiliate>, sqlx::Error> {
    sqlx::query_as::<_, Affiliate>("SELECT * FROM affiliates WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Admin review of an application. Only `pending` applications transition.
pub async fn review_application(
    pool: &PgPool,
    affiliate_id: i32,
    action: ReviewAction,
) -> Result<Affiliate, AffiliateError> {
    let new_status = match action {
        ReviewAction::Approve => "approved",
        ReviewAction::Reject => "rejected",
    };

    let updated = sqlx::query_as::<_, Affiliate>(
        r#"UPDATE affiliates
           SET status = $1
           WHERE id = $2 AND status = 'pending'
           RETURNING *"#,
    )
    .bind(new_status)
    .bind(affiliate_id)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(affiliate) => Ok(affiliate),
        None => {
            let exists = sqlx::query("SELECT 1 FROM affiliates WHERE id = $1")
                .bind(affiliate_id)
                .fetch_optional(pool)
                .await?;
            if exists.is_some() {
                Err(AffiliateError::InvalidState(
                    "application has already been reviewed".to_string(),
                ))
            } else {
                Err(AffiliateError::NotFound)
            }
        }
    }
}

/// Records a referral click for an approved affiliate's code.
pub async fn record_click(pool: &PgPool, code: &str) -> Result<(), AffiliateError> {
    let row = sqlx::query("SELECT id FROM affiliates WHERE code = $1 AND status = 'approved'")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Err(AffiliateError::NotFound);
    };
    let affiliate_id: i32 = row.get("id");

    sqlx::query("INSERT INTO referrals (affiliate_id, kind) VALUES ($1, 'click')")
        .bind(affiliate_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Commission accrued to the affiliate's pending balance.
    Accrued { commission_cents: i64 },
    /// order_id already seen; nothing changed.
    AlreadyRecorded,
    /// Code unknown or affiliate not approved; conversion is not attributed.
    NoAttribution,
}

/// Attributes a paid order to an affiliate code. Idempotent on order_id:
/// a redelivered webhook accrues nothing the second time.
pub async fn record_conversion(
    pool: &PgPool,
    order_id: &str,
    code: &str,
    amount_cents: i64,
) -> Result<ConversionOutcome, AffiliateError> {
    if amount_cents <= 0 {
        return Err(AffiliateError::Validation(
            "conversion amount must be positive".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let seen = sqlx::query("SELECT 1 FROM referrals WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;
    if seen.is_some() {
        return Ok(ConversionOutcome::AlreadyRecorded);
    }

    let row = sqlx::query(
        "SELECT id FROM affiliates WHERE code = $1 AND status = 'approved' FOR UPDATE",
    )
    .bind(code)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Ok(ConversionOutcome::NoAttribution);
    };
    let affiliate_id: i32 = row.get("id");

    let commission = commission_for(amount_cents);

    let inserted = sqlx::query(
        r#"INSERT INTO referrals (affiliate_id, kind, order_id, commission_cents)
           VALUES ($1, 'conversion', $2, $3)
           ON CONFLICT (order_id) DO NOTHING"#,
    )
    .bind(affiliate_id)
    .bind(order_id)
    .bind(commission)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Ok(ConversionOutcome::AlreadyRecorded);
    }

    sqlx::query(
        r#"UPDATE affiliates
           SET pending_earnings_cents = pending_earnings_cents + $1,
               total_earnings_cents = total_earnings_cents + $1
           WHERE id = $2"#,
    )
    .bind(commission)
    .bind(affiliate_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ConversionOutcome::Accrued {
        commission_cents: commission,
    })
}

/// An approved affiliate asks to convert pending earnings into a payout.
/// The request does not debit pending, so the cap is pending minus what is
/// already tied up in other pending payouts.
pub async fn request_payout(
    pool: &PgPool,
    user_id: i32,
    amount_cents: i64,
) -> Result<Payout, AffiliateError> {
    if amount_cents <= 0 {
        return Err(AffiliateError::Validation(
            "payout amount must be positive".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"SELECT id, status, pending_earnings_cents
           FROM affiliates WHERE user_id = $1 FOR UPDATE"#,
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Err(AffiliateError::NotFound);
    };

    let affiliate_id: i32 = row.get("id");
    let status: String = row.get("status");
    let pending_cents: i64 = row.get("pending_earnings_cents");

    if status != "approved" {
        return Err(AffiliateError::InvalidState(
            "affiliate account is not approved".to_string(),
        ));
    }

    let reserved: i64 = sqlx::query(
        r#"SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS reserved
           FROM payouts WHERE affiliate_id = $1 AND status = 'pending'"#,
    )
    .bind(affiliate_id)
    .fetch_one(&mut *tx)
    .await?
    .get("reserved");

    if amount_cents > pending_cents - reserved {
        return Err(AffiliateError::Validation(
            "payout amount exceeds available pending earnings".to_string(),
        ));
    }

    let payout = sqlx::query_as::<_, Payout>(
        r#"INSERT INTO payouts (affiliate_id, amount_cents, status)
           VALUES ($1, $2, 'pending')
           RETURNING *"#,
    )
    .bind(affiliate_id)
    .bind(amount_cents)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(payout)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutAction {
    Complete,
    Reject,
}

impl PayoutAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "complete" => Some(Self::Complete),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Admin transition of a payout out of `pending`. completed and rejected are
/// terminal: a non-pending payout fails here without mutating anything, so a
/// replayed "complete" cannot double-pay.
pub async fn process_payout(
    pool: &PgPool,
    payout_id: i32,
    action: PayoutAction,
    notes: Option<&str>,
) -> Result<Payout, AffiliateError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "SELECT id, affiliate_id, amount_cents, status FROM payouts WHERE id = $1 FOR UPDATE",
    )
    .bind(payout_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Err(AffiliateError::NotFound);
    };

    let affiliate_id: i32 = row.get("affiliate_id");
    let amount_cents: i64 = row.get("amount_cents");
    let status: String = row.get("status");

    if status != "pending" {
        return Err(AffiliateError::InvalidState(format!(
            "payout is already {status}"
        )));
    }

    let payout = match action {
        PayoutAction::Complete => {
            complete_payout(&mut tx, payout_id, affiliate_id, amount_cents, notes).await?
        }
        PayoutAction::Reject => {
            // The amount never left pending, so status + notes is the whole
            // transition; the funds stay available for a future payout.
            sqlx::query_as::<_, Payout>(
                r#"UPDATE payouts
                   SET status = 'rejected', notes = $1, processed_at = $2
                   WHERE id = $3
                   RETURNING *"#,
            )
            .bind(notes)
            .bind(Utc::now())
            .bind(payout_id)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;

    Ok(payout)
}

async fn complete_payout(
    tx: &mut Transaction<'_, Postgres>,
    payout_id: i32,
    affiliate_id: i32,
    amount_cents: i64,
    notes: Option<&str>,
) -> Result<Payout, AffiliateError> {
    let pending_cents: i64 = sqlx::query(
        "SELECT pending_earnings_cents FROM affiliates WHERE id = $1 FOR UPDATE",
    )
    .bind(affiliate_id)
    .fetch_one(&mut **tx)
    .await?
    .get("pending_earnings_cents");

    if pending_cents < amount_cents {
        return Err(AffiliateError::InvalidState(
            "affiliate pending balance is below the payout amount".to_string(),
        ));
    }

    // The one balance move: pending -> paid, total unchanged.
    sqlx::query(
        r#"UPDATE affiliates
           SET pending_earnings_cents = pending_earnings_cents - $1,
               paid_earnings_cents = paid_earnings_cents + $1
           WHERE id = $2"#,
    )
    .bind(amount_cents)
    .bind(affiliate_id)
    .execute(&mut **tx)
    .await?;

    let payout = sqlx::query_as::<_, Payout>(
        r#"UPDATE payouts
           SET status = 'completed', notes = $1, processed_at = $2
           WHERE id = $3
           RETURNING *"#,
    )
    .bind(notes)
    .bind(Utc::now())
    .bind(payout_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(payout)
}
