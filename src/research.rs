// src/research.rs
//
// Outlier research: pull a creator's recent videos from the platform API and
// keep the ones performing far above the channel's median. The ratio math is
// pure so it can be tested without the network.

use serde::{Deserialize, Serialize};
use std::fmt;

const PLATFORM_API_BASE: &str = "https://api.platform-metrics.io";

pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 2.0;

#[derive(Debug)]
pub enum ResearchError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for ResearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchError::Http(e) => write!(f, "http error: {e}"),
            ResearchError::Api { status, body } => {
                write!(f, "platform api error status={status} body={body}")
            }
            ResearchError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl std::error::Error for ResearchError {}

impl From<reqwest::Error> for ResearchError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VideoStats {
    pub id: String,
    pub title: String,
    pub views: u64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelVideosResponse {
    videos: Vec<VideoStats>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Outlier {
    #[serde(flatten)]
    pub video: VideoStats,
    /// views / channel median views.
    pub ratio: f64,
}

pub async fn fetch_channel_videos(
    api_key: &str,
    handle: &str,
) -> Result<Vec<VideoStats>, ResearchError> {
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{PLATFORM_API_BASE}/v1/channels/videos"))
        .header("X-Api-Key", api_key)
        .query(&[("handle", handle), ("limit", "50")])
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(ResearchError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str::<ChannelVideosResponse>(&body)
        .map(|r| r.videos)
        .map_err(|e| ResearchError::InvalidResponse(format!("{e}; body={body}")))
}

fn median_views(videos: &[VideoStats]) -> f64 {
    let mut views: Vec<u64> = videos.iter().map(|v| v.views).collect();
    views.sort_unstable();
    let n = views.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        views[n / 2] as f64
    } else {
        (views[n / 2 - 1] + views[n / 2]) as f64 / 2.0
    }
}

/// Keeps videos whose view count is at least `threshold` times the channel
/// median, highest ratio first. A channel with a zero median has no
/// meaningful baseline and yields nothing.
pub fn filter_outliers(videos: Vec<VideoStats>, threshold: f64) -> Vec<Outlier> {
    let median = median_views(&videos);
    if median <= 0.0 {
        return Vec::new();
    }

    let mut outliers: Vec<Outlier> = videos
        .into_iter()
        .filter_map(|video| {
            let ratio = video.views as f64 / median;
            (ratio >= threshold).then_some(Outlier { video, ratio })
        })
        .collect();

    outliers.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
    outliers
}

pub async fn find_outliers(
    api_key: &str,
    handle: &str,
    threshold: f64,
) -> Result<Vec<Outlier>, ResearchError> {
    let videos = fetch_channel_videos(api_key, handle).await?;
    Ok(filter_outliers(videos, threshold))
}
