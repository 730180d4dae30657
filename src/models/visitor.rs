use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VisitLog {
    pub id: i64,
    pub ip_address: String,
    pub page_visited: String,
    pub visit_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub group_by: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UniqueCountResponse {
    pub count: i64,
}
