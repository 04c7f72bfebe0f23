//! HTTP middleware.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument as _;

/// Correlation ID assigned to each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

/// Assign a [`TraceId`] and run the rest of the stack inside its span.
pub async fn trace_id_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "mdm_request",
        trace_id = %trace_id,
        method = %request.method(),
        uri = %request.uri(),
    );
    request.extensions_mut().insert(TraceId(trace_id));

    async move {
        let response = next.run(request).await;
        tracing::debug!(status = %response.status(), "request completed");
        response
    }
    .instrument(span)
    .await
}
