//! Usage log query DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query parameters for the usage log listing endpoint
#[derive(Debug, Default, Deserialize)]
pub struct UsageQueryParams {
    /// Window start (inclusive); unbounded if absent
    pub from: Option<DateTime<Utc>>,

    /// Window end (exclusive); unbounded if absent
    pub to: Option<DateTime<Utc>>,

    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Aggregated usage statistics for one API key
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageStatsResponse {
    pub api_key_id: i64,
    pub total_requests: i64,
    pub error_requests: i64,
    /// Percentage of requests with status < 400; 0.0 over an empty window
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    /// Request counts keyed by endpoint path
    pub requests_by_endpoint: Vec<EndpointCount>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointCount {
    pub endpoint: String,
    pub count: i64,
}
