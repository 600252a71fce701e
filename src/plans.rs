// src/plans.rs
//
// Static plan catalog: tier -> limit set. An unknown tier string is an
// error, never a silent fallback, so a billing misconfiguration surfaces
// instead of quietly granting free-tier limits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for "no limit" in catalog entries.
pub const UNLIMITED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Pro,
}

impl PlanTier {
    pub fn parse(s: &str) -> Result<Self, UnknownTier> {
        match s {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            other => Err(UnknownTier(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
        }
    }
}

#[derive(Debug)]
pub struct UnknownTier(pub String);

impl fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown plan tier: {}", self.0)
    }
}

impl std::error::Error for UnknownTier {}

/// The window an analysis allowance is measured over. Free and starter
/// meter analyses per calendar week, pro per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisWindow {
    Weekly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub tier: PlanTier,
    pub analysis_window: AnalysisWindow,
    pub analyses_per_window: i32,
    pub optimizations_per_month: i32,
    pub format_refreshes_per_month: i32,
}

impl PlanLimits {
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self {
                tier,
                analysis_window: AnalysisWindow::Weekly,
                analyses_per_window: 3,
                optimizations_per_month: 5,
                format_refreshes_per_month: 2,
            },
            PlanTier::Starter => Self {
                tier,
                analysis_window: AnalysisWindow::Weekly,
                analyses_per_window: 15,
                optimizations_per_month: 50,
                format_refreshes_per_month: 10,
            },
            PlanTier::Pro => Self {
                tier,
                analysis_window: AnalysisWindow::Daily,
                analyses_per_window: UNLIMITED,
                optimizations_per_month: UNLIMITED,
                format_refreshes_per_month: UNLIMITED,
            },
        }
    }
}
