/**
 * UPTIME API - HTTP surface of the kernel
 *
 * ROLE:
 * Exposes the uptime queries and the manual reconciliation trigger.
 *
 * ROUTES:
 * - GET /health                   liveness, always open
 * - GET /system/health            kernel health (cycles, nodes tracked)
 * - GET /info/getNodeInfo         month-to-date figures for ?nodes=a,b
 * - GET /info/getNodeInfoExport   export figures, optional startDate/endDate
 * - GET /info/getAllUptimes       export figures for every known node
 * - GET /info/getMonthlyUptimes   stored monthly summaries for ?nodes=a,b
 * - GET /info/updateNodeInfo      one reconciliation pass (x-api-key required)
 *
 * ERRORS:
 * Every failure answers with a JSON body {"error": "..."}.
 * Bad input is a 400, store or upstream trouble a 500.
 */

use crate::aggregator::Window;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{MonthlySummary, NodeUptime};
use crate::poll::{CycleError, Poller};
use crate::query::{parse_node_keys, QueryError, UptimeQueries};
use crate::reconciler::CycleReport;
use crate::store::UptimeStore;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;

pub const ZERO_NODES: &str = "uptime service: zero nodes in request";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UptimeStore>,
    pub queries: UptimeQueries,
    pub poller: Arc<Poller>,
    pub health: HealthTracker,
    pub api_key: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (code, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Window(_) => ApiError::BadRequest(e.to_string()),
            QueryError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CycleError> for ApiError {
    fn from(e: CycleError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoParams {
    nodes: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl InfoParams {
    fn node_keys(&self) -> Result<Vec<String>, ApiError> {
        let keys = parse_node_keys(self.nodes.as_deref().unwrap_or_default());
        if keys.is_empty() {
            return Err(ApiError::BadRequest(ZERO_NODES.into()));
        }
        Ok(keys)
    }

    /// Explicit window when both bounds are given, `None` otherwise.
    fn window(&self) -> Result<Option<Window>, ApiError> {
        let (Some(start), Some(end)) = (present(&self.start_date), present(&self.end_date)) else {
            return Ok(None);
        };
        let start = parse_epoch("startDate", start)?;
        let end = parse_epoch("endDate", end)?;
        Window::from_unix(start, end)
            .map(Some)
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_epoch(name: &str, raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("{name} must be seconds since epoch, got {raw:?}")))
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = app.api_key.as_deref() else {
        warn!(path = %req.uri().path(), "UPTIME_API_KEY not set, trigger refused");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!(path = %req.uri().path(), "rejected request with missing or wrong api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    let protected = Router::new()
        .route("/info/updateNodeInfo", get(update_node_info))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), require_api_key));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/info/getNodeInfo", get(get_node_info))
        .route("/info/getNodeInfoExport", get(get_node_info_export))
        .route("/info/getAllUptimes", get(get_all_uptimes))
        .route("/info/getMonthlyUptimes", get(get_monthly_uptimes))
        .merge(protected)
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(app.store.as_ref()))
}

// GET /info/getNodeInfo?nodes=a,b
async fn get_node_info(
    State(app): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<Json<Vec<NodeUptime>>, ApiError> {
    let keys = params.node_keys()?;
    Ok(Json(app.queries.month_to_date(&keys, OffsetDateTime::now_utc())?))
}

// GET /info/getNodeInfoExport?nodes=a,b&startDate=..&endDate=..
async fn get_node_info_export(
    State(app): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<Json<Vec<NodeUptime>>, ApiError> {
    let keys = params.node_keys()?;
    let window = params.window()?;
    Ok(Json(app.queries.export(&keys, window, OffsetDateTime::now_utc())?))
}

// GET /info/getAllUptimes
async fn get_all_uptimes(
    State(app): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<Json<Vec<NodeUptime>>, ApiError> {
    let window = params.window()?;
    Ok(Json(app.queries.export_all(window, OffsetDateTime::now_utc())?))
}

// GET /info/getMonthlyUptimes?nodes=a,b
async fn get_monthly_uptimes(
    State(app): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<Json<Vec<MonthlySummary>>, ApiError> {
    let keys = params.node_keys()?;
    Ok(Json(app.queries.monthly_summaries(&keys)?))
}

// GET /info/updateNodeInfo
async fn update_node_info(State(app): State<AppState>) -> Result<Json<CycleReport>, ApiError> {
    Ok(Json(app.poller.run_cycle().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(nodes: Option<&str>, start: Option<&str>, end: Option<&str>) -> InfoParams {
        InfoParams {
            nodes: nodes.map(String::from),
            start_date: start.map(String::from),
            end_date: end.map(String::from),
        }
    }

    #[test]
    fn test_node_keys_required() {
        assert!(matches!(params(None, None, None).node_keys(), Err(ApiError::BadRequest(m)) if m == ZERO_NODES));
        assert!(matches!(params(Some(" , "), None, None).node_keys(), Err(ApiError::BadRequest(_))));
        assert_eq!(params(Some("a, b"), None, None).node_keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_window_needs_both_bounds() {
        assert!(params(None, Some("900"), None).window().unwrap().is_none());
        assert!(params(None, Some(""), Some("1300")).window().unwrap().is_none());

        let w = params(None, Some("900"), Some("1300")).window().unwrap().unwrap();
        assert_eq!(w.len_secs(), 400);
    }

    #[test]
    fn test_bad_window_is_bad_request() {
        assert!(matches!(params(None, Some("yesterday"), Some("1300")).window(), Err(ApiError::BadRequest(_))));
        assert!(matches!(params(None, Some("1300"), Some("900")).window(), Err(ApiError::BadRequest(_))));
    }
}
