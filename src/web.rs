use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::datasources::WeatherProvider;
use crate::error::{AdvisorError, Result};
use crate::logic::AdvisorService;
use crate::mqtt::MqttPublisher;

/// Window and row limit for `/status`
const STATUS_HOURS: i64 = 48;
const STATUS_MAX_ENTRIES: usize = 10;

const DEFAULT_EXECUTION_NOTES: &str = "Home Assistant automatic";

pub struct AppState<P: WeatherProvider> {
    pub advisor: AdvisorService<P>,
    pub publisher: MqttPublisher,
}

pub type SharedState<P> = Arc<AppState<P>>;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router<P: WeatherProvider + 'static>(state: SharedState<P>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/recommendation", get(recommendation::<P>))
        .route("/mark_executed", post(mark_executed::<P>))
        .route("/status", get(status::<P>))
        .route("/publish_mqtt", post(publish_mqtt::<P>))
        .with_state(state)
}

fn error_response(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "irrigation-advisor" }))
}

async fn recommendation<P: WeatherProvider>(State(state): State<SharedState<P>>) -> Response {
    let outcome = state.advisor.advise().await;

    match &outcome.error {
        None => Json(json!({
            "success": true,
            "recommendation": outcome.message,
            "recent_irrigation": outcome.recent_irrigation_mm(),
        }))
        .into_response(),
        Some(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": error,
                "recommendation": outcome.message,
            })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct MarkExecutedRequest {
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
}

async fn mark_executed<P: WeatherProvider>(
    State(state): State<SharedState<P>>,
    Json(request): Json<MarkExecutedRequest>,
) -> Response {
    if let Some(amount) = request.amount {
        if !amount.is_finite() || amount < 0.0 {
            return error_response(StatusCode::BAD_REQUEST, "amount must be a non-negative number");
        }
    }

    let notes = request
        .notes
        .unwrap_or_else(|| DEFAULT_EXECUTION_NOTES.to_string());

    match state.advisor.store().mark_executed(request.amount, Some(notes)) {
        Ok(entry) => {
            let amount = entry.applied_amount();
            tracing::info!(amount, "Execution reported over HTTP");
            Json(json!({
                "success": true,
                "message": format!("Irrigation marked as executed: {}L/m²", amount),
                "entry": entry,
            }))
            .into_response()
        }
        Err(e @ AdvisorError::InvalidData(_)) => error_response(StatusCode::BAD_REQUEST, e),
        Err(e) => {
            tracing::error!(error = %e, "Failed to mark execution");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

#[derive(Debug, Serialize)]
struct RecentEntry {
    timestamp: DateTime<Utc>,
    amount: f64,
    executed: bool,
    reason: String,
}

async fn status<P: WeatherProvider>(State(state): State<SharedState<P>>) -> Response {
    let store = state.advisor.store();
    let now = Utc::now();

    let result = store.status_summary(now).and_then(|summary| {
        let recent: Vec<RecentEntry> = store
            .recent_irrigation(STATUS_HOURS, now)?
            .into_iter()
            .take(STATUS_MAX_ENTRIES)
            .map(|e| RecentEntry {
                timestamp: e.execution_timestamp.unwrap_or(e.timestamp),
                amount: e.applied_amount(),
                executed: e.executed,
                reason: e.reason,
            })
            .collect();
        Ok((summary, recent))
    });

    match result {
        Ok((summary, recent)) => Json(json!({
            "success": true,
            "status": summary,
            "recent_irrigation": recent,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read status");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn publish_mqtt<P: WeatherProvider>(State(state): State<SharedState<P>>) -> Response {
    let outcome = state.advisor.advise().await;

    match state
        .publisher
        .publish_cycle(&outcome.message, outcome.recommendation.as_ref())
        .await
    {
        Ok(report) => Json(json!({
            "success": report.success(),
            "message": outcome.message,
            "mqtt_published": report.success(),
            "report": report,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "MQTT publish failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

// ---------------------------------------------------------------------------
// Periodic publishing
// ---------------------------------------------------------------------------

/// Run advise + publish every `minutes` until the task is dropped
pub async fn auto_publish<P: WeatherProvider>(state: SharedState<P>, minutes: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(minutes.max(1) * 60));
    tracing::info!(interval_minutes = minutes, "Auto-publish enabled");

    loop {
        ticker.tick().await;
        let outcome = state.advisor.advise().await;
        match state
            .publisher
            .publish_cycle(&outcome.message, outcome.recommendation.as_ref())
            .await
        {
            Ok(report) if report.success() => {
                tracing::info!(
                    watering_required = outcome.message.watering_required,
                    amount = outcome.message.water_amount_lpm2,
                    "Scheduled recommendation published"
                );
            }
            Ok(_) => tracing::warn!("Scheduled publish reached no topic"),
            Err(e) => tracing::error!(error = %e, "Scheduled publish failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve<P: WeatherProvider + 'static>(
    state: SharedState<P>,
    config: &ServerConfig,
) -> Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "HTTP service listening");

    let timer = config
        .auto_publish_interval_minutes
        .filter(|m| *m > 0)
        .map(|minutes| tokio::spawn(auto_publish(state.clone(), minutes)));

    let result = axum::serve(listener, router(state)).await;

    if let Some(timer) = timer {
        timer.abort();
    }
    result.map_err(Into::into)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MqttConfig};
    use crate::db::Database;
    use crate::logic::advisor::testing::FakeProvider;
    use crate::state::StateStore;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn config() -> Config {
        Config::from_yaml(
            "openweathermap:\n  api_key: test\n  latitude: 47.5\n  longitude: 19.0\n",
        )
        .unwrap()
    }

    fn state(provider: FakeProvider) -> SharedState<FakeProvider> {
        let store: Arc<dyn StateStore> = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(AppState {
            advisor: AdvisorService::new(provider, store, &config()),
            publisher: MqttPublisher::new(MqttConfig::default()).dry_run(true),
        })
    }

    fn failing() -> FakeProvider {
        FakeProvider {
            forecast: None,
            ..FakeProvider::dry_week()
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    // -- health ---------------------------------------------------------------

    #[tokio::test]
    async fn health_reports_service() {
        let (status, body) = send(router(state(FakeProvider::dry_week())), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "irrigation-advisor");
    }

    // -- recommendation -------------------------------------------------------

    #[tokio::test]
    async fn recommendation_runs_cycle_and_logs() {
        let state = state(FakeProvider::dry_week());
        let (status, body) = send(router(state.clone()), get_req("/recommendation")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["recommendation"]["watering_required"], true);
        assert_eq!(body["recent_irrigation"], 0.0);
        assert_eq!(state.advisor.store().entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recommendation_failure_returns_fallback() {
        let (status, body) = send(router(state(failing())), get_req("/recommendation")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["recommendation"]["watering_required"], false);
        assert_eq!(body["recommendation"]["water_amount_lpm2"], 0.0);
        assert_eq!(body["recommendation"]["reason"], "data fetch failed");
    }

    #[tokio::test]
    async fn recommendation_suppressed_after_recent_irrigation() {
        let state = state(FakeProvider::dry_week());
        state.advisor.store().mark_executed(Some(10.0), None).unwrap();

        let (_, body) = send(router(state), get_req("/recommendation")).await;
        assert_eq!(body["recommendation"]["watering_required"], false);
        assert_eq!(body["recent_irrigation"], 10.0);
    }

    // -- mark_executed --------------------------------------------------------

    #[tokio::test]
    async fn mark_executed_records_amount() {
        let state = state(FakeProvider::dry_week());
        state.advisor.store().log_recommendation(12.0, "dry").unwrap();

        let (status, body) = send(
            router(state.clone()),
            post_json("/mark_executed", json!({ "amount": 9.5, "notes": "zone 2" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["entry"]["actual_amount"], 9.5);
        let entries = state.advisor.store().entries().unwrap();
        assert!(entries[0].executed);
        assert_eq!(entries[0].notes.as_deref(), Some("zone 2"));
    }

    #[tokio::test]
    async fn mark_executed_default_notes() {
        let state = state(FakeProvider::dry_week());
        state.advisor.store().log_recommendation(12.0, "dry").unwrap();

        let (status, _) = send(router(state.clone()), post_json("/mark_executed", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let entries = state.advisor.store().entries().unwrap();
        assert_eq!(entries[0].actual_amount, Some(12.0));
        assert_eq!(entries[0].notes.as_deref(), Some(DEFAULT_EXECUTION_NOTES));
    }

    #[tokio::test]
    async fn mark_executed_rejects_negative_amount() {
        let (status, body) = send(
            router(state(FakeProvider::dry_week())),
            post_json("/mark_executed", json!({ "amount": -2.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn mark_executed_without_pending_or_amount_is_bad_request() {
        let (status, _) = send(
            router(state(FakeProvider::dry_week())),
            post_json("/mark_executed", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // -- status ---------------------------------------------------------------

    #[tokio::test]
    async fn status_lists_recent_executions() {
        let state = state(FakeProvider::dry_week());
        let store = state.advisor.store();
        store.log_recommendation(10.0, "dry").unwrap();
        store.mark_executed(Some(8.0), None).unwrap();
        store.log_recommendation(15.0, "hot").unwrap();

        let (status, body) = send(router(state.clone()), get_req("/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["pending_recommendations"], 1);
        assert_eq!(body["status"]["recent_24h"]["total_amount"], 8.0);

        let recent = body["recent_irrigation"].as_array().unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0]["amount"], 8.0);
        assert_eq!(recent[0]["reason"], "dry");
    }

    #[tokio::test]
    async fn status_caps_recent_entries() {
        let state = state(FakeProvider::dry_week());
        for _ in 0..12 {
            state.advisor.store().mark_executed(Some(1.0), None).unwrap();
        }

        let (_, body) = send(router(state), get_req("/status")).await;
        assert_eq!(body["recent_irrigation"].as_array().unwrap().len(), STATUS_MAX_ENTRIES);
    }

    // -- publish_mqtt ---------------------------------------------------------

    #[tokio::test]
    async fn publish_mqtt_dry_run() {
        let (status, body) = send(
            router(state(FakeProvider::dry_week())),
            Request::builder()
                .method("POST")
                .uri("/publish_mqtt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["mqtt_published"], true);
        assert_eq!(body["message"]["watering_required"], true);
        assert_eq!(body["report"]["dry_run"], true);
        assert_eq!(body["report"]["results"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = router(state(FakeProvider::dry_week()))
            .oneshot(get_req("/nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
