// src/api/admin.rs
//
// Admin surface. Authentication happens in JwtMiddleware; the role check is
// the shared `forbid_non_admin` predicate at the top of every handler here.

use actix_web::{get, patch, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::affiliates::{self, PayoutAction, ReviewAction};
use crate::api::affiliate::affiliate_error_response;
use crate::api::auth::{forbid_non_admin, AuthedUser};
use crate::models::{Affiliate, Payout};
use crate::{db, research, tickets, AppState};

// ---- tickets ----

#[get("/tickets")]
pub async fn list_tickets(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    match tickets::list_all_by_activity(&state.pool).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            log::error!("admin list tickets error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[post("/tickets/{id}/close")]
pub async fn close_ticket(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    match tickets::close_any(&state.pool, path.into_inner()).await {
        Ok(Some(ticket)) => HttpResponse::Ok().json(ticket),
        Ok(None) => HttpResponse::NotFound().json(json!({"error": "ticket not found"})),
        Err(e) => {
            log::error!("admin close ticket error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminReplyRequest {
    pub body: String,
}

#[post("/tickets/{id}/reply")]
pub async fn reply_ticket(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
    payload: web::Json<AdminReplyRequest>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    let body = payload.body.trim();
    if body.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "reply body is required"}));
    }

    let ticket_id = path.into_inner();

    match tickets::exists(&state.pool, ticket_id).await {
        Ok(true) => {}
        Ok(false) => return HttpResponse::NotFound().json(json!({"error": "ticket not found"})),
        Err(e) => {
            log::error!("admin reply lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    }

    match tickets::add_message(&state.pool, ticket_id, user.id, true, body).await {
        Ok(message) => HttpResponse::Ok().json(message),
        Err(e) => {
            log::error!("admin reply error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// ---- payouts ----

async fn list_payouts_rows(pool: &PgPool) -> Result<Vec<Payout>, sqlx::Error> {
    sqlx::query_as::<_, Payout>("SELECT * FROM payouts ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

#[get("/payouts")]
pub async fn list_payouts(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    match list_payouts_rows(&state.pool).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            log::error!("admin list payouts error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessPayoutRequest {
    /// "complete" or "reject"
    pub action: String,
    pub notes: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/admin/payouts/{id}",
    request_body = ProcessPayoutRequest,
    responses(
        (status = 200, description = "payout transitioned"),
        (status = 400, description = "invalid action or payout not pending"),
        (status = 401), (status = 403), (status = 404)
    ),
    tag = "admin"
)]
#[patch("/payouts/{id}")]
pub async fn process_payout(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
    payload: web::Json<ProcessPayoutRequest>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    let Some(action) = PayoutAction::parse(&payload.action) else {
        return HttpResponse::BadRequest().json(json!({
            "error": "action must be complete or reject"
        }));
    };

    match affiliates::process_payout(
        &state.pool,
        path.into_inner(),
        action,
        payload.notes.as_deref(),
    )
    .await
    {
        Ok(payout) => HttpResponse::Ok().json(json!({"success": true, "payout": payout})),
        Err(e) => affiliate_error_response("process_payout", e),
    }
}

// ---- affiliate applications ----

#[get("/affiliates")]
pub async fn list_affiliates(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    let result = sqlx::query_as::<_, Affiliate>("SELECT * FROM affiliates ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await;

    match result {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            log::error!("admin list affiliates error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewAffiliateRequest {
    /// "approve" or "reject"
    pub action: String,
}

#[patch("/affiliates/{id}")]
pub async fn review_affiliate(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
    payload: web::Json<ReviewAffiliateRequest>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    let Some(action) = ReviewAction::parse(&payload.action) else {
        return HttpResponse::BadRequest().json(json!({
            "error": "action must be approve or reject"
        }));
    };

    match affiliates::review_application(&state.pool, path.into_inner(), action).await {
        Ok(affiliate) => HttpResponse::Ok().json(json!({"success": true, "affiliate": affiliate})),
        Err(e) => affiliate_error_response("review_application", e),
    }
}

// ---- users ----

#[get("/users")]
pub async fn list_users(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    match db::list_users(&state.pool).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => {
            log::error!("admin list users error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    /// "deactivate" or "reactivate"
    pub action: String,
}

#[patch("/users/{id}")]
pub async fn update_user(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    path: web::Path<i32>,
    payload: web::Json<UpdateUserRequest>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    let target = path.into_inner();
    let result = match payload.action.as_str() {
        "deactivate" => db::deactivate_user(&state.pool, target).await,
        "reactivate" => db::reactivate_user(&state.pool, target).await,
        _ => {
            return HttpResponse::BadRequest().json(json!({
                "error": "action must be deactivate or reactivate"
            }))
        }
    };

    match result {
        Ok(true) => HttpResponse::Ok().json(json!({"success": true})),
        Ok(false) => HttpResponse::NotFound().json(json!({"error": "user not found"})),
        Err(e) => {
            log::error!("admin update user error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

// ---- outlier research ----

#[derive(Debug, Deserialize)]
pub struct OutlierQuery {
    pub handle: String,
    pub threshold: Option<f64>,
}

#[get("/research/outliers")]
pub async fn research_outliers(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    query: web::Query<OutlierQuery>,
) -> impl Responder {
    if let Some(resp) = forbid_non_admin(&user) {
        return resp;
    }

    let handle = query.handle.trim();
    if handle.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "handle is required"}));
    }

    let threshold = query
        .threshold
        .unwrap_or(research::DEFAULT_OUTLIER_THRESHOLD);
    if !(threshold.is_finite() && threshold > 0.0) {
        return HttpResponse::BadRequest().json(json!({"error": "threshold must be positive"}));
    }

    match research::find_outliers(&state.research_api_key, handle, threshold).await {
        Ok(outliers) => HttpResponse::Ok().json(json!({
            "handle": handle,
            "threshold": threshold,
            "outliers": outliers
        })),
        Err(e) => {
            log::error!("find_outliers error for handle {handle}: {e}");
            HttpResponse::BadGateway().json(json!({"error": "research provider unavailable"}))
        }
    }
}
