//! Federation endpoint: stored partitions rendered in the text format

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;

use crate::data::store::MemoryStore;
use crate::domain::metrics::decode::ExpositionFormat;
use crate::domain::metrics::encode::encode_text;
use crate::domain::metrics::pack::pack;

#[derive(Clone)]
pub struct FederateState {
    pub store: Arc<MemoryStore>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FederateQuery {
    /// Restrict output to one partition
    pub partition: Option<String>,
}

pub fn routes(store: Arc<MemoryStore>) -> Router {
    Router::new()
        .route("/federate", get(federate))
        .with_state(FederateState { store })
}

pub async fn federate(
    State(state): State<FederateState>,
    Query(query): Query<FederateQuery>,
) -> Response {
    let families = match &query.partition {
        Some(key) => state.store.partition(key).unwrap_or_default(),
        None => state
            .store
            .read_metrics()
            .into_iter()
            .flat_map(|p| p.families)
            .collect(),
    };

    // Partitions may share family names; the text format needs them grouped
    let body = encode_text(&pack(families));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, ExpositionFormat::TEXT_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::data::store::{PartitionedMetrics, Store};
    use crate::domain::RequestContext;
    use crate::domain::metrics::family::{Gauge, LabelPair, Metric, MetricFamily, MetricType};

    fn up(partition: &str) -> MetricFamily {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metric.push(Metric {
            label: vec![LabelPair::new("_id", partition)],
            gauge: Some(Gauge { value: Some(1.0) }),
            ..Default::default()
        });
        family
    }

    async fn store_with(keys: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let (ctx, _guard) = RequestContext::with_timeout(Duration::from_secs(5));
        for key in keys {
            store
                .write_metrics(&ctx, PartitionedMetrics::new(*key, vec![up(key)]))
                .await
                .unwrap();
        }
        store
    }

    async fn get_text(router: Router, uri: &str) -> String {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_partitions_grouped_under_one_family() {
        let router = routes(store_with(&["a", "b"]).await);
        let text = get_text(router, "/federate").await;

        assert_eq!(
            text,
            "# TYPE up gauge\nup{_id=\"a\"} 1\nup{_id=\"b\"} 1\n"
        );
    }

    #[tokio::test]
    async fn test_single_partition() {
        let router = routes(store_with(&["a", "b"]).await);
        let text = get_text(router, "/federate?partition=b").await;
        assert_eq!(text, "# TYPE up gauge\nup{_id=\"b\"} 1\n");
    }

    #[tokio::test]
    async fn test_unknown_partition_is_empty() {
        let router = routes(store_with(&["a"]).await);
        assert!(get_text(router, "/federate?partition=zzz").await.is_empty());
    }
}
