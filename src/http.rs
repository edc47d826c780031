use crate::collectors::aggregate::Aggregator;
use crate::collectors::CollectError;
use crate::metrics::Metrics;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, warn};

pub const TOKEN_HEADER: &str = "X-Stackscope-Token";

#[derive(Clone)]
pub struct HttpAppState {
    pub aggregator: Aggregator,
    pub metrics: Arc<Metrics>,
    pub token: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
#[error("unauthorized")]
pub struct AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

pub fn build_router(state: HttpAppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/extended", get(extended_handler))
        .route("/agent/metrics", get(agent_metrics_handler))
        .with_state(state)
}

impl HttpAppState {
    /// Header first, then the `token` query parameter. No configured token
    /// lets every request through.
    fn authorize(&self, request: &Request) -> Result<(), AuthError> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };

        let header_ok = request
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected);
        if header_ok {
            return Ok(());
        }

        let query_ok = Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.token)
            .is_some_and(|t| t == expected);
        if query_ok {
            return Ok(());
        }

        self.metrics.inc_auth_failure();
        Err(AuthError)
    }

    async fn collect<T, F>(&self, payload: &str, fut: F) -> Result<T, CollectError>
    where
        F: Future<Output = Result<T, CollectError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CollectError::Timeout(self.request_timeout)),
        };
        self.metrics.observe_collect(payload, started.elapsed());
        result
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>, request: Request) -> Response {
    state.metrics.inc_request("metrics");
    if let Err(err) = state.authorize(&request) {
        return err.into_response();
    }

    match state.collect("basic", state.aggregator.build_basic()).await {
        Ok(payload) => json_response(&payload),
        Err(err) => {
            error!(error = %err, "collect metrics failed");
            state.metrics.inc_collect_error("basic");
            unavailable()
        }
    }
}

async fn extended_handler(State(state): State<HttpAppState>, request: Request) -> Response {
    state.metrics.inc_request("metrics_extended");
    if let Err(err) = state.authorize(&request) {
        return err.into_response();
    }

    match state
        .collect("extended", state.aggregator.build_extended())
        .await
    {
        Ok(report) => {
            for section in &report.degraded {
                state.metrics.inc_collect_error(section);
            }
            json_response(&report.payload)
        }
        Err(err) => {
            error!(error = %err, "collect extended metrics failed");
            state.metrics.inc_collect_error("extended");
            unavailable()
        }
    }
}

async fn agent_metrics_handler(State(state): State<HttpAppState>, request: Request) -> Response {
    state.metrics.inc_request("agent_metrics");
    if let Err(err) = state.authorize(&request) {
        return err.into_response();
    }

    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {err}"),
        )
            .into_response(),
    }
}

fn json_response<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec_pretty(value) {
        Ok(mut body) => {
            body.push(b'\n');
            let mut response = Response::new(Body::from(body));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            warn!(error = %err, "encode metrics failed");
            unavailable()
        }
    }
}

fn unavailable() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::source::FsStat;
    use crate::collectors::testing::FakeSource;
    use crate::config::BuildInfo;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    const STAT_BEFORE: &str = "cpu  100 0 0 100 0 0 0 0\nbtime 1700000000\n";
    const STAT_AFTER: &str = "cpu  150 0 0 150 0 0 0 0\nbtime 1700000000\n";
    const NET_HEADER: &str = "Inter-|   Receive\n face |bytes\n";

    fn source(stat_after: &str) -> FakeSource {
        FakeSource::new()
            .with_samples("stat", STAT_BEFORE, stat_after)
            .with(
                "meminfo",
                "MemTotal: 8000000 kB\nMemAvailable: 800000 kB\nSwapTotal: 0 kB\nSwapFree: 0 kB\n",
            )
            .with("loadavg", "0.10 0.20 0.30 1/100 42\n")
            .with("uptime", "120.00 240.00\n")
            .with("diskstats", "")
            .with("net/dev", NET_HEADER)
            .with("mounts", "/dev/sda1 / ext4 rw 0 0\n")
            .with("vmstat", "oom_kill 0\n")
            .with_fs(
                "/",
                FsStat {
                    block_size: 4096,
                    blocks: 1000,
                    blocks_available: 500,
                    files: 100,
                    files_free: 50,
                },
            )
    }

    fn app(source: FakeSource, token: Option<&str>) -> (Router, Arc<Metrics>) {
        let build = BuildInfo::from_env();
        let metrics = Metrics::new(&build).expect("metrics init");
        let router = build_router(HttpAppState {
            aggregator: Aggregator::new(Arc::new(source), build),
            metrics: metrics.clone(),
            token: token.map(str::to_string),
            request_timeout: Duration::from_secs(30),
        });
        (router, metrics)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_ok_without_token() {
        let (app, _) = app(source(STAT_AFTER), Some("s3cret"));
        let response = app.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn metrics_rejects_missing_token() {
        let (app, metrics) = app(source(STAT_AFTER), Some("s3cret"));
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "unauthorized");
        assert_eq!(metrics.agent_auth_failures_total.get(), 1.0);
    }

    #[tokio::test]
    async fn metrics_rejects_wrong_header_and_query() {
        let (app, _) = app(source(STAT_AFTER), Some("s3cret"));
        let wrong_header = Request::builder()
            .uri("/metrics")
            .header(TOKEN_HEADER, "nope")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(wrong_header).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.clone().oneshot(get("/metrics?token=nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "unauthorized");

        let response = app
            .clone()
            .oneshot(get("/metrics/extended?token=nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(get("/agent/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_accepts_header_token() {
        let (app, _) = app(source(STAT_AFTER), Some("s3cret"));
        let request = Request::builder()
            .uri("/metrics")
            .header(TOKEN_HEADER, "s3cret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["cpu_usage"], 50.0);
        assert_eq!(json["memory_usage"], 90.0);
        assert_eq!(json["disk_usage"], 50.0);
        assert_eq!(json["uptime_seconds"], 120);
    }

    #[tokio::test(start_paused = true)]
    async fn extended_accepts_query_token() {
        let (app, _) = app(source(STAT_AFTER), Some("s3cret"));
        let response = app
            .oneshot(get("/metrics/extended?token=s3cret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["cpu_usage"], 50.0);
        assert_eq!(json["health"]["status"], "warning");
        assert_eq!(json["health"]["reasons"][0], "memory usage >= 90%");
        assert_eq!(json["meta"]["schema_version"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_configured_token_authorizes_everything() {
        let (app, _) = app(source(STAT_AFTER), None);
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_counters_return_500() {
        let (app, metrics) = app(source(STAT_BEFORE), None);
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "metrics unavailable");
        assert_eq!(
            metrics
                .agent_collect_errors_total
                .with_label_values(&["basic"])
                .get(),
            1.0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn agent_metrics_exposes_request_counts() {
        let (app, _) = app(source(STAT_AFTER), None);
        let response = app.clone().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/agent/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("agent_requests_total{endpoint=\"metrics\"} 1"));
        assert!(text.contains("agent_collect_duration_seconds_count{payload=\"basic\"} 1"));
    }
}
