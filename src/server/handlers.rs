use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::core::models::{ActiveSessions, CostReport, TodayUsage};
use crate::core::sessions::SessionRegistry;
use crate::cost::Aggregator;

/// Shared application state
pub struct AppState {
    pub aggregator: Aggregator,
    pub registry: SessionRegistry,
    pub daily_budget: f64,
    pub max_concurrent: usize,
}

impl AppState {
    fn report_for(&self, date: NaiveDate) -> Result<(CostReport, usize), ApiError> {
        let result = self.aggregator.aggregate(date).map_err(|e| {
            tracing::error!(%date, error = %e, "Aggregation failed");
            ApiError::internal("Failed to fetch usage data", e.to_string())
        })?;

        let active = result.active_sessions();
        Ok((CostReport::from_aggregate(&result, self.daily_budget), active))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl ApiError {
    fn internal(error: &str, details: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.to_string(),
            details: Some(details),
        }
    }

    fn bad_request(error: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error,
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Runs a blocking aggregation off the async executor.
async fn blocking<T, F>(state: Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| ApiError::internal("Usage scan task failed", e.to_string()))?
}

/// Today's headline usage numbers
pub async fn usage_today(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TodayUsage>, ApiError> {
    let today = Utc::now().date_naive();
    let (report, active) = blocking(state, move |s| s.report_for(today)).await?;
    Ok(Json(TodayUsage::from_report(&report, active)))
}

/// Full cost breakdown for today
pub async fn cost_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CostReport>, ApiError> {
    let today = Utc::now().date_naive();
    let (report, _) = blocking(state, move |s| s.report_for(today)).await?;
    Ok(Json(report))
}

/// Full cost breakdown for a given YYYY-MM-DD date
pub async fn usage_for_date(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<CostReport>, ApiError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid date: {}, expected YYYY-MM-DD", date)))?;

    let (report, _) = blocking(state, move |s| s.report_for(date)).await?;
    Ok(Json(report))
}

/// Sessions listed in the runtime's registry
pub async fn active_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveSessions>, ApiError> {
    let sessions = blocking(state, |s| {
        Ok(s.registry.active_sessions(Utc::now(), s.max_concurrent))
    })
    .await?;
    Ok(Json(sessions))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::AggregatorConfig;

    fn state_for(dir: &std::path::Path) -> Arc<AppState> {
        Arc::new(AppState {
            aggregator: Aggregator::new(AggregatorConfig::new(dir)),
            registry: SessionRegistry::in_dir(dir),
            daily_budget: 3.0,
            max_concurrent: 4,
        })
    }

    #[tokio::test]
    async fn test_usage_for_date_rejects_bad_date() {
        let temp = tempfile::tempdir().expect("temp dir");
        let err = usage_for_date(State(state_for(temp.path())), Path("18-01-2026".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_sessions_dir_is_internal_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        let state = state_for(&temp.path().join("missing"));

        let err = cost_report(State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error, "Failed to fetch usage data");
        assert!(err.details.is_some());
    }

    #[tokio::test]
    async fn test_usage_for_date_reads_logs() {
        let temp = tempfile::tempdir().expect("temp dir");
        let line = serde_json::json!({
            "type": "message",
            "timestamp": "2026-01-18T10:00:00Z",
            "message": {"model": "claude-3-opus", "sessionId": "s1", "usage": {"input": 100_000, "output": 10_000}}
        });
        std::fs::write(temp.path().join("a.jsonl"), format!("{}\n", line)).unwrap();

        let Json(report) = usage_for_date(State(state_for(temp.path())), Path("2026-01-18".to_string()))
            .await
            .unwrap();
        assert_eq!(report.summary.total_messages, 1);
        assert_eq!(report.summary.total_cost, 2.25);
        assert_eq!(report.summary.budget_used, 75.0);
    }

    #[tokio::test]
    async fn test_active_sessions_without_registry() {
        let temp = tempfile::tempdir().expect("temp dir");
        let Json(sessions) = active_sessions(State(state_for(temp.path()))).await.unwrap();
        assert_eq!(sessions.count, 0);
        assert_eq!(sessions.max_concurrent, 4);
    }
}
