use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::db::MetricStore;
use crate::error::AppError;
use crate::quota::{QuotaStats, QuotaTracker};
use crate::sync::{ManualOutcome, SchedulerState, SyncScheduler};
use crate::types::{DateRange, MergedMetric};

#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<SyncScheduler>,
    pub store: Arc<dyn MetricStore>,
    pub quota: Arc<QuotaTracker>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/quota", get(get_quota))
        .route("/metrics", get(get_metrics))
        .route("/sync", post(post_sync))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query / body structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub scheduler: SchedulerState,
    #[serde(flatten)]
    pub counters: HealthSnapshot,
}

#[derive(Serialize)]
pub struct QuotaResponse {
    #[serde(flatten)]
    pub stats: QuotaStats,
    pub next_available_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        scheduler: state.scheduler.state().await,
        counters: state.health.snapshot(),
    })
}

async fn get_quota(State(state): State<ApiState>) -> Json<QuotaResponse> {
    let (stats, next_available_at) = state.quota.snapshot();
    Json(QuotaResponse {
        stats,
        next_available_at,
    })
}

async fn get_metrics(
    State(state): State<ApiState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<MergedMetric>>, AppError> {
    let range = DateRange::new(params.start, params.end)?;
    let rows = state.store.list_range(range).await?;
    Ok(Json(rows))
}

async fn post_sync(
    State(state): State<ApiState>,
    Json(body): Json<RangeParams>,
) -> Result<Json<ManualOutcome>, AppError> {
    let outcome = state
        .scheduler
        .run_manual_update(body.start, body.end)
        .await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use tower::util::ServiceExt;

    use super::*;
    use crate::db::memory::InMemoryStore;
    use crate::feed::InMemoryFeeds;
    use crate::quota::ManualClock;
    use crate::sync::{EtlService, SchedulerSettings};
    use crate::types::{ConversionRecord, SpendRecord};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn test_state(ceiling: usize) -> ApiState {
        let clock = Arc::new(ManualClock::at("2025-06-05T08:00:00Z"));
        let store: Arc<dyn MetricStore> = Arc::new(InMemoryStore::new());
        let feeds = Arc::new(InMemoryFeeds::new(
            vec![
                SpendRecord { date: d("2025-06-04"), campaign_id: "C1".into(), spend: dec!(37.50) },
                SpendRecord { date: d("2025-06-05"), campaign_id: "C2".into(), spend: dec!(11.00) },
            ],
            vec![ConversionRecord { date: d("2025-06-04"), campaign_id: "C1".into(), conversions: 14 }],
        ));
        let quota = Arc::new(QuotaTracker::new(ceiling, clock.clone()));
        let health = Arc::new(HealthState::new());
        let scheduler = Arc::new(SyncScheduler::new(
            EtlService::new(feeds, store.clone()),
            quota.clone(),
            clock,
            health.clone(),
            SchedulerSettings { interval: Duration::from_secs(1800), window_days: 7 },
        ));
        ApiState { scheduler, store, quota, health }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_disarmed_scheduler() {
        let response = router(test_state(80)).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["scheduler"], "disarmed");
        assert_eq!(json["ticks_completed"], 0);
    }

    #[tokio::test]
    async fn quota_endpoint_reflects_usage() {
        let state = test_state(2);
        state.quota.consume();
        state.quota.consume();

        let response = router(state).oneshot(get("/quota")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["used"], 2);
        assert_eq!(json["reserved"], 0);
        assert_eq!(json["available"], 0);
        assert_eq!(json["total"], 2);
        assert!(json["next_available_at"].is_string());
    }

    #[tokio::test]
    async fn sync_then_query_metrics() {
        let state = test_state(80);
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/sync", r#"{"start": "2025-06-04", "end": "2025-06-04"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["summary"]["records"], 1);
        assert_eq!(state.quota.stats().used, 1);

        let response = app
            .oneshot(get("/metrics?start=2025-06-01&end=2025-06-30"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["campaign_id"], "C1");
        assert_eq!(rows[0]["cpa"], "2.68");
    }

    #[tokio::test]
    async fn sync_rejected_when_quota_spent() {
        let state = test_state(0);
        let response = router(state)
            .oneshot(post_json("/sync", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["stats"]["total"], 0);
    }

    #[tokio::test]
    async fn inverted_range_is_bad_request() {
        let app = router(test_state(80));
        let response = app
            .clone()
            .oneshot(post_json("/sync", r#"{"start": "2025-06-05", "end": "2025-06-01"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(get("/metrics?start=2025-06-05&end=2025-06-01"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
