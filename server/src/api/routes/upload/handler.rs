//! Upload endpoint

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use tokio::sync::oneshot;

use super::UploadState;
use super::encoding::{ContentEncoding, body_decoder, format_from_headers};
use super::error::UploadError;
use crate::domain::metrics::transform::MultiTransformer;
use crate::domain::{IngestError, Outcome, RequestContext};

/// Accept one push of metric families.
///
/// The pipeline runs on its own task and reports back over a oneshot
/// channel. If the request deadline passes first the handler answers with a
/// timeout and leaves the task to finish on its own.
pub async fn upload(
    State(state): State<UploadState>,
    request: Request,
) -> Result<StatusCode, UploadError> {
    if request.method() != Method::POST {
        return Err(UploadError::MethodNotAllowed);
    }

    let (ctx, _guard) = RequestContext::with_timeout(state.timeout);
    let (parts, body) = request.into_parts();

    let validated = state
        .validator
        .validate(&ctx, &parts)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Upload validation failed"))?;
    let partition_key = validated.partition_key;

    let chain = MultiTransformer::new()
        .with_all(validated.transforms)
        .with(state.transformer.clone());
    let encoding = ContentEncoding::from_headers(&parts.headers);
    let format = format_from_headers(&parts.headers);

    let (tx, rx) = oneshot::channel();
    let task_ctx = ctx.clone();
    let task_key = partition_key.clone();
    let pipeline = state.pipeline.clone();
    let max_body_bytes = state.max_body_bytes;
    tokio::spawn(async move {
        let outcome = match body_decoder(body, max_body_bytes, encoding, format).await {
            Ok(mut decoder) => {
                pipeline
                    .run(&task_ctx, task_key, decoder.as_mut(), &chain)
                    .await
            }
            Err(e) => Outcome::Failure(IngestError::Decode(e)),
        };
        if let Err(outcome) = tx.send(outcome) {
            tracing::debug!(?outcome, "Upload outcome dropped, handler already responded");
        }
    });

    tokio::select! {
        biased;
        outcome = rx => match outcome {
            Ok(Outcome::Success) => {
                tracing::debug!(partition_key = %partition_key, "Metrics stored");
                Ok(StatusCode::OK)
            }
            Ok(Outcome::RateLimited(key)) => {
                tracing::debug!(partition_key = %key, "Upload rate limited");
                Err(UploadError::RateLimited { partition_key: key })
            }
            Ok(Outcome::Failure(e)) => {
                tracing::warn!(partition_key = %partition_key, error = %e, "Upload failed");
                Err(UploadError::Ingest(e))
            }
            Err(_) => {
                tracing::error!(partition_key = %partition_key, "Ingestion task ended without an outcome");
                Err(UploadError::TaskLost)
            }
        },
        reason = ctx.done() => {
            tracing::error!(
                partition_key = %partition_key,
                reason = %reason,
                timeout_ms = state.timeout.as_millis() as u64,
                "Timeout while storing metrics"
            );
            Err(UploadError::Timeout)
        }
    }
}
