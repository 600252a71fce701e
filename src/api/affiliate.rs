// src/api/affiliate.rs

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::affiliates::{self, AffiliateError, NewApplication};
use crate::api::auth::AuthedUser;
use crate::AppState;

/// Normalizes business errors to the response taxonomy: validation and
/// state-machine rejections are 400 with a readable message, missing rows
/// are 404, database failures are logged and become a bare 500.
pub(crate) fn affiliate_error_response(context: &str, e: AffiliateError) -> HttpResponse {
    match e {
        AffiliateError::Validation(_) | AffiliateError::Duplicate(_) => {
            HttpResponse::BadRequest().json(json!({"error": e.to_string()}))
        }
        AffiliateError::InvalidState(_) => {
            HttpResponse::BadRequest().json(json!({"error": e.to_string()}))
        }
        AffiliateError::NotFound => HttpResponse::NotFound().json(json!({"error": "not found"})),
        AffiliateError::Db(e) => {
            log::error!("{context}: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/affiliate/me",
    responses((status = 200), (status = 401)),
    tag = "affiliate"
)]
#[get("/affiliate/me")]
pub async fn affiliate_me(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    match affiliates::affiliate_for_user(&state.pool, user.id).await {
        Ok(Some(affiliate)) => HttpResponse::Ok().json(json!({"affiliate": affiliate})),
        Ok(None) => HttpResponse::Ok().json(json!({"affiliate": null})),
        Err(e) => {
            log::error!("affiliate_for_user error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub has_social_following: Option<bool>,
    pub social_handle: Option<String>,
    pub paypal_email: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/public/affiliate/apply",
    request_body = ApplyRequest,
    responses(
        (status = 200, description = "application accepted"),
        (status = 400, description = "invalid fields or duplicate application")
    ),
    tag = "affiliate"
)]
#[post("/affiliate/apply")]
pub async fn apply(state: web::Data<AppState>, payload: web::Json<ApplyRequest>) -> impl Responder {
    let payload = payload.into_inner();

    let application = NewApplication {
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        date_of_birth: payload.date_of_birth,
        has_social_following: payload.has_social_following,
        social_handle: payload.social_handle,
        paypal_email: payload.paypal_email,
        user_id: None,
    };

    match affiliates::create_public_application(&state.pool, application).await {
        Ok(_) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Application received. We'll be in touch once it has been reviewed."
        })),
        Err(e) => affiliate_error_response("create_public_application", e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub code: String,
}

/// Public click tracking for referral links. An unknown or unapproved code
/// is not an error worth telling the visitor about.
#[post("/referrals/click")]
pub async fn referral_click(
    state: web::Data<AppState>,
    payload: web::Json<ClickRequest>,
) -> impl Responder {
    match affiliates::record_click(&state.pool, &payload.code).await {
        Ok(()) | Err(AffiliateError::NotFound) => {
            HttpResponse::Ok().json(json!({"success": true}))
        }
        Err(e) => affiliate_error_response("record_click", e),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequestBody {
    pub amount_cents: i64,
}

#[post("/affiliate/payouts")]
pub async fn request_payout(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
    payload: web::Json<PayoutRequestBody>,
) -> impl Responder {
    match affiliates::request_payout(&state.pool, user.id, payload.amount_cents).await {
        Ok(payout) => HttpResponse::Ok().json(json!({"success": true, "payout": payout})),
        Err(e) => affiliate_error_response("request_payout", e),
    }
}
