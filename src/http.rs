use crate::metrics::Metrics;
use crate::state::Store;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub store: Arc<Store>,
    pub persisted_path: Arc<PathBuf>,
}

pub fn build_router(metrics: Arc<Metrics>, store: Arc<Store>, persisted_path: PathBuf) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/metrics", get(current_handler))
        .route("/api/history", get(history_handler))
        .route("/api/metrics.json", get(persisted_handler))
        .with_state(HttpAppState {
            metrics,
            store,
            persisted_path: Arc::new(persisted_path),
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
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
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

async fn current_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    Json(state.store.current().await)
}

async fn history_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    Json(state.store.history().await)
}

/// The file as the persister last left it, byte for byte.
async fn persisted_handler(State(state): State<HttpAppState>) -> Response {
    match tokio::fs::read(state.persisted_path.as_path()).await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "снимок ещё не сохранён").into_response()
        }
        Err(err) => {
            warn!(path = %state.persisted_path.display(), error = %err, "не удалось прочитать сохранённый снимок");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("ошибка чтения снимка: {err}"),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::Persister;
    use crate::snapshot::Snapshot;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn app(store: Arc<Store>, persisted_path: PathBuf) -> Router {
        let metrics = Metrics::new().expect("инициализация метрик");
        build_router(metrics, store, persisted_path)
    }

    fn snap(hostname: &str, uptime_sec: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            hostname: hostname.to_string(),
            uptime_sec,
            ..Snapshot::default()
        })
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = app(Arc::new(Store::default()), PathBuf::from("/nonexistent"));
        let (status, body) = get_body(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn current_returns_zero_snapshot_before_first_tick() {
        let app = app(Arc::new(Store::default()), PathBuf::from("/nonexistent"));
        let (status, body) = get_body(app, "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["uptime_sec"], 0);
        assert_eq!(value["net"], serde_json::json!([]));
        assert!(value.get("cpu_percent").is_some());
    }

    #[tokio::test]
    async fn current_and_history_follow_the_store() {
        let store = Arc::new(Store::default());
        store.publish(snap("a", 1)).await;
        store.publish(snap("b", 2)).await;

        let (_, body) = get_body(app(store.clone(), PathBuf::from("/x")), "/api/metrics").await;
        let current: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(current["hostname"], "b");

        let (status, body) = get_body(app(store, PathBuf::from("/x")), "/api/history").await;
        assert_eq!(status, StatusCode::OK);
        let history: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        let uptimes: Vec<u64> = history
            .iter()
            .map(|s| s["uptime_sec"].as_u64().unwrap())
            .collect();
        assert_eq!(uptimes, [1, 2]);
    }

    #[tokio::test]
    async fn persisted_file_is_served_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Persister::new(dir.path(), "metrics.json");
        let store = Arc::new(Store::default());

        let (status, _) =
            get_body(app(store.clone(), persister.target().to_path_buf()), "/api/metrics.json")
                .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        persister.try_save(&snap("disk", 9)).unwrap();
        let (status, body) =
            get_body(app(store, persister.target().to_path_buf()), "/api/metrics.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, std::fs::read(persister.target()).unwrap());
    }

    #[tokio::test]
    async fn metrics_endpoint_exposes_prometheus_text() {
        let metrics = Metrics::new().expect("инициализация метрик");
        metrics.update_from_snapshot(&snap("m", 5), 1);
        let app = build_router(metrics, Arc::new(Store::default()), PathBuf::from("/x"));

        let (status, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("sysdash_uptime_seconds 5"));
        assert!(text.contains("sysdash_scrape_count_total 1"));
    }
}
