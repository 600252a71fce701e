// src/tickets.rs
//
// Support ticket lifecycle: open <-> closed, append-only messages. Ownership
// is a query filter, so a ticket that exists but belongs to someone else
// reads the same as one that does not exist.

use sqlx::PgPool;

use crate::models::{Ticket, TicketMessage};

pub async fn list_for_user(pool: &PgPool, user_id: i32) -> Result<Vec<Ticket>, sqlx::Error> {
    sqlx::query_as::<_, Ticket>(
        "SELECT * FROM tickets WHERE user_id = $1 ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Admin view, most recently active first. Admin replies bump updated_at, so
/// this is "what was touched last" ordering.
pub async fn list_all_by_activity(pool: &PgPool) -> Result<Vec<Ticket>, sqlx::Error> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets ORDER BY updated_at DESC")
        .fetch_all(pool)
        .await
}

/// Creates the ticket and its first message together.
pub async fn create(
    pool: &PgPool,
    user_id: i32,
    subject: &str,
    body: &str,
) -> Result<Ticket, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let ticket = sqlx::query_as::<_, Ticket>(
        r#"INSERT INTO tickets (user_id, subject, status)
           VALUES ($1, $2, 'open')
           RETURNING *"#,
    )
    .bind(user_id)
    .bind(subject)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"INSERT INTO ticket_messages (ticket_id, author_id, from_admin, body)
           VALUES ($1, $2, FALSE, $3)"#,
    )
    .bind(ticket.id)
    .bind(user_id)
    .bind(body)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ticket)
}

/// Fetch a ticket the caller is allowed to see. Admins see every ticket.
pub async fn get_visible(
    pool: &PgPool,
    ticket_id: i32,
    user_id: i32,
    is_admin: bool,
) -> Result<Option<Ticket>, sqlx::Error> {
    let query = if is_admin {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1").bind(ticket_id)
    } else {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1 AND user_id = $2")
            .bind(ticket_id)
            .bind(user_id)
    };
    query.fetch_optional(pool).await
}

pub async fn messages(pool: &PgPool, ticket_id: i32) -> Result<Vec<TicketMessage>, sqlx::Error> {
    sqlx::query_as::<_, TicketMessage>(
        "SELECT * FROM ticket_messages WHERE ticket_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await
}

/// Owner-only status change (open/closed). Returns None when the ticket is
/// missing or not owned by the caller.
pub async fn set_status_owned(
    pool: &PgPool,
    ticket_id: i32,
    user_id: i32,
    status: &str,
) -> Result<Option<Ticket>, sqlx::Error> {
    sqlx::query_as::<_, Ticket>(
        r#"UPDATE tickets
           SET status = $1, updated_at = NOW()
           WHERE id = $2 AND user_id = $3
           RETURNING *"#,
    )
    .bind(status)
    .bind(ticket_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Admin close, no ownership filter.
pub async fn close_any(pool: &PgPool, ticket_id: i32) -> Result<Option<Ticket>, sqlx::Error> {
    sqlx::query_as::<_, Ticket>(
        r#"UPDATE tickets
           SET status = 'closed', updated_at = NOW()
           WHERE id = $1
           RETURNING *"#,
    )
    .bind(ticket_id)
    .fetch_optional(pool)
    .await
}

/// Permanent delete, owner or admin. Messages go with the ticket.
pub async fn delete(
    pool: &PgPool,
    ticket_id: i32,
    user_id: i32,
    is_admin: bool,
) -> Result<bool, sqlx::Error> {
    let result = if is_admin {
        sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .execute(pool)
            .await?
    } else {
        sqlx::query("DELETE FROM tickets WHERE id = $1 AND user_id = $2")
            .bind(ticket_id)
            .bind(user_id)
            .execute(pool)
            .await?
    };

    Ok(result.rows_affected() > 0)
}

/// Appends a message. Admin replies bump the ticket's updated_at so the
/// admin list surfaces recently-answered tickets first.
pub async fn add_message(
    pool: &PgPool,
    ticket_id: i32,
    author_id: i32,
    from_admin: bool,
    body: &str,
) -> Result<TicketMessage, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let message = sqlx::query_as::<_, TicketMessage>(
        r#"INSERT INTO ticket_messages (ticket_id, author_id, from_admin, body)
           VALUES ($1, $2, $3, $4)
           RETURNING *"#,
    )
    .bind(ticket_id)
    .bind(author_id)
    .bind(from_admin)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    if from_admin {
        sqlx::query("UPDATE tickets SET updated_at = NOW() WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(message)
}

pub async fn exists(pool: &PgPool, ticket_id: i32) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM tickets WHERE id = $1")
        .bind(ticket_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}
