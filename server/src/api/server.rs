//! API server initialization

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;

use super::middleware;
use super::routes::upload::UploadState;
use super::routes::{federate, health, upload};
use crate::core::CoreApp;
use crate::domain::IngestPipeline;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Full HTTP surface: push, federation and health
    pub fn router(app: &CoreApp) -> Router {
        let upload_state = UploadState {
            validator: app.validator.clone(),
            pipeline: IngestPipeline::new(app.store.clone()),
            transformer: app.transformer.clone(),
            timeout: app.config.ingest.timeout,
            max_body_bytes: app.config.ingest.max_body_bytes,
        };

        Router::new()
            .route("/healthz", get(health::health))
            .merge(upload::routes(upload_state))
            .merge(federate::routes(Arc::clone(&app.memory)))
            .fallback(middleware::handle_404)
            .layer(middleware::trace_layer())
            .layer(DefaultBodyLimit::max(app.config.ingest.max_body_bytes))
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        let shutdown = app.shutdown.clone();
        let host = app.config.server.host.clone();
        let port = app.config.server.port;

        let router = Self::router(&app);

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", host, port))?;
        tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::core::ShutdownService;
    use crate::core::cli::CliConfig;
    use crate::core::config::AppConfig;
    use crate::data::store::{MemoryStore, PartitionedMetrics, Store, StoreError};
    use crate::domain::RequestContext;

    /// Triggers server shutdown while a write is in flight, then completes it
    struct ShutdownDuringWrite {
        shutdown: ShutdownService,
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl Store for ShutdownDuringWrite {
        async fn write_metrics(
            &self,
            ctx: &RequestContext,
            batch: PartitionedMetrics,
        ) -> Result<(), StoreError> {
            self.shutdown.trigger();
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.inner.write_metrics(ctx, batch).await
        }
    }

    fn test_app(cli: CliConfig) -> CoreApp {
        CoreApp::from_config(AppConfig::load(&cli).unwrap()).unwrap()
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn push(key: &str, body: &'static str) -> Request<Body> {
        Request::post("/upload")
            .header("X-Partition-Key", key)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_push_then_federate() {
        let app = test_app(CliConfig {
            elide_labels: Some(vec!["instance".to_string()]),
            ..Default::default()
        });
        let router = ApiServer::router(&app);

        let (status, _) = call(
            router.clone(),
            push("edge-1", "# TYPE up gauge\nup{instance=\"h:9100\",job=\"node\"} 1\n"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, text) = call(
            router,
            Request::get("/federate").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "# TYPE up gauge\nup{_id=\"edge-1\",job=\"node\"} 1\n");
    }

    #[tokio::test]
    async fn test_second_push_within_interval_is_429() {
        let app = test_app(CliConfig::default());
        let router = ApiServer::router(&app);

        let (first, _) = call(router.clone(), push("edge-1", "up 1\n")).await;
        let (second, message) = call(router.clone(), push("edge-1", "up 2\n")).await;
        let (other, _) = call(router, push("edge-2", "up 1\n")).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert!(message.contains("edge-1"));
        assert_eq!(other, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_partition_header() {
        let app = test_app(CliConfig::default());
        let request = Request::post("/upload").body(Body::from("up 1\n")).unwrap();

        let (status, message) = call(ApiServer::router(&app), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("x-partition-key"));
        assert!(app.memory.is_empty());
    }

    #[tokio::test]
    async fn test_whitelist_drops_unlisted_families() {
        let app = test_app(CliConfig {
            whitelist: Some(vec!["up".to_string()]),
            write_interval_secs: Some(0),
            ..Default::default()
        });

        let (status, _) = call(
            ApiServer::router(&app),
            push("edge-1", "up 1\nprocess_cpu_seconds_total 3\n"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let families = app.memory.partition("edge-1").unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name(), "up");
    }

    #[tokio::test]
    async fn test_in_flight_push_completes_during_shutdown() {
        let mut app = test_app(CliConfig::default());
        app.store = Arc::new(ShutdownDuringWrite {
            shutdown: app.shutdown.clone(),
            inner: Arc::clone(&app.memory),
        });

        let (status, body) = call(ApiServer::router(&app), push("edge-1", "up 1\n")).await;

        assert!(app.shutdown.is_triggered());
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert!(app.memory.partition("edge-1").is_some());
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = test_app(CliConfig::default());
        let (status, _) = call(
            ApiServer::router(&app),
            Request::get("/healthz").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
