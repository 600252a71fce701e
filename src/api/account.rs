// src/api/account.rs

use actix_web::{delete, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::auth::AuthedUser;
use crate::db::{self, NewsletterError, DEACTIVATION_GRACE_DAYS};
use crate::AppState;

#[utoipa::path(
    delete,
    path = "/api/user",
    responses((status = 200, description = "account deactivated"), (status = 401)),
    tag = "account"
)]
#[delete("/user")]
pub async fn delete_account(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    match db::deactivate_user(&state.pool, user.id).await {
        Ok(true) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!(
                "Account deactivated. Data will be removed after {DEACTIVATION_GRACE_DAYS} days."
            )
        })),
        // Already deactivated counts as done; the account is gone either way.
        Ok(false) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => {
            log::error!("deactivate_user error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewsletterRequest {
    pub email: String,
}

#[utoipa::path(
    post,
    path = "/api/newsletter",
    request_body = NewsletterRequest,
    responses((status = 200), (status = 400, description = "invalid or duplicate email")),
    tag = "account"
)]
// Registered at app level, ahead of the JWT-guarded /api scope.
#[post("/api/newsletter")]
pub async fn newsletter_subscribe(
    state: web::Data<AppState>,
    payload: web::Json<NewsletterRequest>,
) -> impl Responder {
    match db::subscribe_newsletter(&state.pool, &payload.email).await {
        Ok(()) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e @ (NewsletterError::InvalidEmail | NewsletterError::Duplicate)) => {
            HttpResponse::BadRequest().json(json!({"error": e.to_string()}))
        }
        Err(NewsletterError::Db(e)) => {
            log::error!("subscribe_newsletter error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
