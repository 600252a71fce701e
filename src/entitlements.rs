// src/entitlements.rs
//
// Read-only entitlement checks. Evaluation never writes: usage is charged by
// the record_* functions in `usage`, called only after the gated action has
// actually completed, so a failed analysis is never billed.

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::plans::{PlanLimits, PlanTier, UNLIMITED};
use crate::usage;

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalysisEntitlement {
    pub can_analyze: bool,
    /// Analyses left in the current window; `-1` for unlimited plans.
    pub remaining: i32,
    pub message: String,
}

/// Pure rule: may a user with `limits` run another analysis after having
/// used `used` in the current window?
pub fn evaluate_analysis(limits: &PlanLimits, used: i64) -> AnalysisEntitlement {
    let limit = limits.analyses_per_window;

    if limit == UNLIMITED {
        return AnalysisEntitlement {
            can_analyze: true,
            remaining: UNLIMITED,
            message: "Unlimited analyses on your plan.".to_string(),
        };
    }

    let remaining = (i64::from(limit) - used).max(0) as i32;
    let message = if remaining > 0 {
        format!("{remaining} analyses remaining this period.")
    } else {
        "Analysis limit reached for this period. Upgrade your plan for more.".to_string()
    };

    AnalysisEntitlement {
        can_analyze: remaining > 0,
        remaining,
        message,
    }
}

/// Loads the current window's usage for `user_id` and evaluates. A user with
/// no usage rows yet reads as zero used.
pub async fn can_perform_analysis(
    pool: &PgPool,
    user_id: i32,
    tier: PlanTier,
) -> Result<AnalysisEntitlement, sqlx::Error> {
    let limits = PlanLimits::for_tier(tier);
    let from = usage::analysis_window_start(limits.analysis_window, usage::today_utc());
    let used = usage::analyses_used_since(pool, user_id, from).await?;
    Ok(evaluate_analysis(&limits, used))
}
