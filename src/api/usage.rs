// src/api/usage.rs

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::auth::AuthedUser;
use crate::plans::{AnalysisWindow, PlanLimits, UNLIMITED};
use crate::{db, entitlements, usage, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryUsage {
    pub used: i64,
    pub limit: i32,
    pub unlimited: bool,
}

impl CategoryUsage {
    fn new(used: i64, limit: i32) -> Self {
        Self {
            used,
            limit,
            unlimited: limit == UNLIMITED,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub plan: String,
    pub analysis_window: AnalysisWindow,
    pub analysis_window_start: chrono::NaiveDate,
    pub month_start: chrono::NaiveDate,
    pub analyses: CategoryUsage,
    pub optimizations: CategoryUsage,
    pub format_searches: CategoryUsage,
}

#[utoipa::path(
    get,
    path = "/api/usage",
    responses((status = 200, body = UsageSummary), (status = 401)),
    tag = "usage"
)]
#[get("/usage")]
pub async fn get_usage(state: web::Data<AppState>, user: web::ReqData<AuthedUser>) -> impl Responder {
    let user_id = user.id;

    let tier = match db::resolve_plan_tier(&state.pool, user_id).await {
        Ok(t) => t,
        Err(e) => {
            log::error!("resolve_plan_tier error for user {user_id}: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    let limits = PlanLimits::for_tier(tier);

    let today = usage::today_utc();
    let window_start = usage::analysis_window_start(limits.analysis_window, today);

    let analyses_used = match usage::analyses_used_since(&state.pool, user_id, window_start).await {
        Ok(n) => n,
        Err(e) => {
            log::error!("analyses_used_since error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let monthly = match usage::monthly_counters(&state.pool, user_id, today).await {
        Ok(m) => m,
        Err(e) => {
            log::error!("monthly_counters error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(UsageSummary {
        plan: tier.as_str().to_string(),
        analysis_window: limits.analysis_window,
        analysis_window_start: window_start,
        month_start: usage::month_start(today),
        analyses: CategoryUsage::new(analyses_used, limits.analyses_per_window),
        optimizations: CategoryUsage::new(
            i64::from(monthly.optimizations),
            limits.optimizations_per_month,
        ),
        format_searches: CategoryUsage::new(
            i64::from(monthly.format_searches),
            limits.format_refreshes_per_month,
        ),
    })
}

/// Read-only entitlement check for the client to gate its UI on.
#[get("/analysis/entitlement")]
pub async fn analysis_entitlement(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    let tier = match db::resolve_plan_tier(&state.pool, user.id).await {
        Ok(t) => t,
        Err(e) => {
            log::error!("resolve_plan_tier error for user {}: {e}", user.id);
            return HttpResponse::InternalServerError().finish();
        }
    };

    match entitlements::can_perform_analysis(&state.pool, user.id, tier).await {
        Ok(ent) => HttpResponse::Ok().json(ent),
        Err(e) => {
            log::error!("can_perform_analysis error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/analysis/record",
    responses((status = 200), (status = 401)),
    tag = "usage"
)]
#[post("/analysis/record")]
pub async fn record_analysis(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    match usage::record_analysis_usage(&state.pool, user.id).await {
        Ok(()) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => {
            log::error!("record_analysis_usage error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[post("/optimization/record")]
pub async fn record_optimization(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    match usage::record_optimization_usage(&state.pool, user.id).await {
        Ok(()) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => {
            log::error!("record_optimization_usage error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[post("/format-search/record")]
pub async fn record_format_search(
    state: web::Data<AppState>,
    user: web::ReqData<AuthedUser>,
) -> impl Responder {
    match usage::record_format_search_usage(&state.pool, user.id).await {
        Ok(()) => HttpResponse::Ok().json(json!({"success": true})),
        Err(e) => {
            log::error!("record_format_search_usage error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
