//! Control-plane API handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use color_eyre::eyre::WrapErr as _;
use serde::{Deserialize, Serialize};

use mdm_core::Command;
use mdm_push::{PushReport, Pusher};
use mdm_storage::{CommandQueueStore, EnqueueReport, PushCertStore};

use crate::{HttpError, InputError};

/// Shared state of the API endpoints.
pub struct ApiState<St, P> {
    pub store: Arc<St>,
    pub pusher: Arc<P>,
}

impl<St, P> Clone for ApiState<St, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pusher: Arc::clone(&self.pusher),
        }
    }
}

/// Push certificate response.
#[derive(Debug, Serialize)]
pub struct PushCertResponse {
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<chrono::DateTime<chrono::Utc>>,
}

fn invalid(e: color_eyre::eyre::Report) -> InputError {
    InputError::Invalid(format!("{e:#}"))
}

/// Store a push certificate from a PEM bundle holding the certificate and
/// its unencrypted private key.
pub async fn store_push_cert<St, P>(
    State(state): State<ApiState<St, P>>,
    body: Bytes,
) -> Result<Json<PushCertResponse>, HttpError>
where
    St: PushCertStore,
{
    let bundle = std::str::from_utf8(&body)
        .map_err(|_| InputError::Invalid("push certificate bundle is not UTF-8".into()))?;
    let (cert_pem, key_pem) = mdm_crypto::split_cert_and_key(bundle).map_err(invalid)?;
    let cert_der = mdm_crypto::parse_pem_cert(&cert_pem).map_err(invalid)?;
    let topic = mdm_crypto::extract_topic_from_cert(&cert_der).map_err(invalid)?;
    let not_after = mdm_crypto::cert_not_after(&cert_der).ok();

    state
        .store
        .store_push_cert(&topic, &cert_pem, &key_pem)
        .wrap_err("failed to store push certificate")?;
    tracing::info!(topic, ?not_after, "push certificate stored");

    Ok(Json(PushCertResponse { topic, not_after }))
}

/// Split a comma-separated id list from the path.
fn parse_ids(ids: &str) -> Result<Vec<String>, InputError> {
    let ids: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    if ids.is_empty() {
        return Err(InputError::Invalid("no enrollment ids".into()));
    }
    Ok(ids)
}

/// Push notifications to enrollments.
pub async fn push_handler<St, P>(
    State(state): State<ApiState<St, P>>,
    Path(ids): Path<String>,
) -> Result<Json<PushReport>, HttpError>
where
    P: Pusher,
{
    let ids = parse_ids(&ids)?;
    let report = state.pusher.push(&ids).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct EnqueueParams {
    /// Skip the push after enqueueing.
    #[serde(default)]
    pub nopush: Option<String>,
}

impl EnqueueParams {
    fn skip_push(&self) -> bool {
        self.nopush
            .as_deref()
            .is_some_and(|v| !matches!(v, "0" | "false"))
    }
}

/// Enqueue command response.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub request_type: String,
    #[serde(flatten)]
    pub enqueue: EnqueueReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
}

/// Enqueue a raw command plist for enrollments, then push to them.
///
/// Answers 500 only when no target could be queued; partial results are
/// reported per target.
pub async fn enqueue_handler<St, P>(
    State(state): State<ApiState<St, P>>,
    Path(ids): Path<String>,
    Query(params): Query<EnqueueParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<EnqueueResponse>), HttpError>
where
    St: CommandQueueStore,
    P: Pusher,
{
    let ids = parse_ids(&ids)?;
    let command = Command::decode(&body)?;

    let enqueue = state
        .store
        .enqueue_command(&ids, &command)
        .wrap_err("failed to enqueue command")?;
    tracing::info!(
        command_uuid = %command.command_uuid,
        request_type = %command.request_type,
        enqueued = enqueue.enqueued.len(),
        failed = enqueue.failed.len(),
        "command enqueued"
    );

    let mut push = None;
    let mut push_error = None;
    if !params.skip_push() && !enqueue.enqueued.is_empty() {
        match state.pusher.push(&enqueue.enqueued).await {
            Ok(report) => push = Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "push after enqueue failed");
                push_error = Some(format!("{e:#}"));
            }
        }
    }

    let status = if enqueue.enqueued.is_empty() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(EnqueueResponse {
            request_type: command.request_type,
            enqueue,
            push,
            push_error,
        }),
    ))
}
