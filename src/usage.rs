// src/usage.rs
//
// Per-user, per-period usage counters. All increments are single upsert
// statements so two simultaneous requests from the same user cannot lose a
// count; there is no read-modify-write in application code.
//
// Reset boundaries: analysis weeks start UTC Monday 00:00, monthly counters
// reset at UTC midnight on the 1st, pro's daily window is the UTC calendar
// day. Nothing resets rows in place; a new period simply keys a new row.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};

use crate::plans::AnalysisWindow;

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

pub fn month_start(day: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(day.year(), day.month(), 1).expect("first of month")
}

/// Start of the current analysis window for a plan's metering mode.
pub fn analysis_window_start(window: AnalysisWindow, day: NaiveDate) -> NaiveDate {
    match window {
        AnalysisWindow::Weekly => week_start(day),
        AnalysisWindow::Daily => day,
    }
}

#[derive(Debug, Default)]
pub struct MonthlyCounters {
    pub optimizations: i32,
    pub format_searches: i32,
}

/// Monthly counters for the month containing `day`. A missing row reads as
/// zero usage (lazy initialization), not an error.
pub async fn monthly_counters(
    pool: &PgPool,
    user_id: i32,
    day: NaiveDate,
) -> Result<MonthlyCounters, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT optimizations, format_searches
           FROM usage_counters
           WHERE user_id = $1 AND month_start = $2"#,
    )
    .bind(user_id)
    .bind(month_start(day))
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|r| MonthlyCounters {
            optimizations: r.get("optimizations"),
            format_searches: r.get("format_searches"),
        })
        .unwrap_or_default())
}

/// Analyses used in the window starting at `from_day` (inclusive) up to today.
pub async fn analyses_used_since(
    pool: &PgPool,
    user_id: i32,
    from_day: NaiveDate,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT COALESCE(SUM(count), 0)::BIGINT AS used
           FROM analysis_usage
           WHERE user_id = $1 AND day >= $2"#,
    )
    .bind(user_id)
    .bind(from_day)
    .fetch_one(pool)
    .await?;

    Ok(row.get("used"))
}

pub async fn record_analysis_usage(pool: &PgPool, user_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO analysis_usage (user_id, day, count)
           VALUES ($1, $2, 1)
           ON CONFLICT (user_id, day)
           DO UPDATE SET count = analysis_usage.count + 1"#,
    )
    .bind(user_id)
    .bind(today_utc())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn record_optimization_usage(pool: &PgPool, user_id: i32) -> Result<(), sqlx::Error> {
    bump_monthly_counter(pool, user_id, "optimizations").await
}

pub async fn record_format_search_usage(pool: &PgPool, user_id: i32) -> Result<(), sqlx::Error> {
    bump_monthly_counter(pool, user_id, "format_searches").await
}

async fn bump_monthly_counter(
    pool: &PgPool,
    user_id: i32,
    column: &str,
) -> Result<(), sqlx::Error> {
    // `column` is one of two fixed names, never caller input.
    let sql = format!(
        "INSERT INTO usage_counters (user_id, month_start, {column}) \
         VALUES ($1, $2, 1) \
         ON CONFLICT (user_id, month_start) \
         DO UPDATE SET {column} = usage_counters.{column} + 1"
    );

    sqlx::query(&sql)
        .bind(user_id)
        .bind(month_start(today_utc()))
        .execute(pool)
        .await?;

    Ok(())
}
