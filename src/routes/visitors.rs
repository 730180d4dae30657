use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode, header::REFERER},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::models::{StatsQuery, UniqueCountResponse, VisitLog};
use crate::routes::auth::extract_current_user;
use crate::routes::internal_error;

pub fn visitors_routes() -> Router<SqlitePool> {
    Router::new()
        .route("/track", post(track_visit))
        .route("/stats", get(visit_stats))
        .route("/pie", get(visits_by_page))
        .route("/all", get(recent_visits))
        .route("/unique/count", get(unique_visitor_count))
}

/// Fire-and-forget tracking ping sent on every page load. The page is taken
/// from the Referer since the front end sends no body.
async fn track_visit(
    State(pool): State<SqlitePool>,
    connect_info: Result<ConnectInfo<SocketAddr>, axum::extract::rejection::ExtensionRejection>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let ip_address = client_ip(&headers, connect_info.ok().map(|ConnectInfo(addr)| addr));
    let page_visited = referer_path(&headers);

    sqlx::query("INSERT INTO visit_logs (ip_address, page_visited, visit_time) VALUES (?, ?, ?)")
        .bind(&ip_address)
        .bind(&page_visited)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"message": "Visit recorded"})),
    ))
}

/// Bar-chart data: label -> visit count. Day labels cover the past 30 days,
/// month labels the past 12 months; an explicit date narrows to that day.
async fn visit_stats(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let group_by = query.group_by.as_deref().unwrap_or("day");
    let label_format = match group_by {
        "day" => "%Y-%m-%d",
        "month" => "%Y-%m",
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"detail": "groupBy must be 'day' or 'month'"})),
            ));
        }
    };

    let rows: Vec<(String, i64)> = match &query.date {
        Some(date) => {
            let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"detail": "date must be formatted as YYYY-MM-DD"})),
                )
            })?;

            sqlx::query_as(&format!(
                r#"SELECT strftime('{label_format}', visit_time) AS label, COUNT(*)
                   FROM visit_logs
                   WHERE date(visit_time) = ?
                   GROUP BY label
                   ORDER BY label"#,
            ))
            .bind(parsed.format("%Y-%m-%d").to_string())
            .fetch_all(&pool)
            .await
            .map_err(internal_error)?
        }
        None => {
            let window = if group_by == "day" {
                Duration::days(30)
            } else {
                Duration::days(365)
            };
            let cutoff = Utc::now() - window;

            sqlx::query_as(&format!(
                r#"SELECT strftime('{label_format}', visit_time) AS label, COUNT(*)
                   FROM visit_logs
                   WHERE visit_time >= ?
                   GROUP BY label
                   ORDER BY label"#,
            ))
            .bind(cutoff)
            .fetch_all(&pool)
            .await
            .map_err(internal_error)?
        }
    };

    let stats: BTreeMap<String, i64> = rows.into_iter().collect();
    Ok(Json(stats))
}

/// Pie-chart data: page -> visit count, all time.
async fn visits_by_page(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT page_visited, COUNT(*) FROM visit_logs GROUP BY page_visited ORDER BY page_visited",
    )
    .fetch_all(&pool)
    .await
    .map_err(internal_error)?;

    let stats: BTreeMap<String, i64> = rows.into_iter().collect();
    Ok(Json(stats))
}

/// Visits from the past month, newest first, for the dashboard table.
async fn recent_visits(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let cutoff = Utc::now() - Duration::days(30);
    let visits = sqlx::query_as::<_, VisitLog>(
        "SELECT * FROM visit_logs WHERE visit_time >= ? ORDER BY visit_time DESC",
    )
    .bind(cutoff)
    .fetch_all(&pool)
    .await
    .map_err(internal_error)?;

    Ok(Json(visits))
}

async fn unique_visitor_count(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT ip_address) FROM visit_logs")
        .fetch_one(&pool)
        .await
        .map_err(internal_error)?;

    Ok(Json(UniqueCountResponse { count }))
}

/// Prefers X-Forwarded-For (set by the reverse proxy) over the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extracts the path of the page that issued the tracking ping.
fn referer_path(headers: &HeaderMap) -> String {
    let Some(referer) = headers.get(REFERER).and_then(|v| v.to_str().ok()) else {
        return "/".to_string();
    };

    if let Some(rest) = referer.split_once("://").map(|(_, rest)| rest) {
        match rest.find('/') {
            Some(idx) => rest[idx..].to_string(),
            None => "/".to_string(),
        }
    } else if referer.starts_with('/') {
        referer.to_string()
    } else {
        "/".to_string()
    }
}
