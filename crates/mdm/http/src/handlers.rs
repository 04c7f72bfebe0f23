//! MDM device endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use mdm_core::{CheckinMessage, CommandResults, DeviceCertificate, Request, to_plist_xml};
use mdm_crypto::CertVerifier;
use mdm_service::{Checkin, CommandAndReportResults};

use crate::{HttpError, InputError, TraceId};

/// Headers a TLS-terminating proxy may forward the client certificate in.
const CERT_HEADERS: [&str; 4] = [
    "Client-Cert",
    "X-Ssl-Client-Cert",
    "X-Client-Cert",
    "Ssl-Client-Cert",
];

/// Shared state of the device endpoints.
pub struct MdmState<S> {
    pub service: Arc<S>,
    pub verifier: Option<Arc<dyn CertVerifier>>,
}

impl<S> Clone for MdmState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            verifier: self.verifier.clone(),
        }
    }
}

/// Handle MDM check-in requests.
pub async fn checkin_handler<S>(
    State(state): State<MdmState<S>>,
    Extension(TraceId(trace_id)): Extension<TraceId>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError>
where
    S: Checkin,
{
    let req = device_request(&state, &headers, trace_id, params)?;
    let msg = CheckinMessage::decode(&body)?;
    tracing::debug!(message_type = msg.message_type(), "check-in received");

    let service = &state.service;
    let response = match &msg {
        CheckinMessage::Authenticate(m) => {
            service.authenticate(&req, m).await?;
            None
        }
        CheckinMessage::TokenUpdate(m) => {
            service.token_update(&req, m).await?;
            None
        }
        CheckinMessage::CheckOut(m) => {
            service.checkout(&req, m).await?;
            None
        }
        CheckinMessage::UserAuthenticate(m) => service.user_authenticate(&req, m).await?,
        CheckinMessage::SetBootstrapToken(m) => {
            service.set_bootstrap_token(&req, m).await?;
            None
        }
        CheckinMessage::GetBootstrapToken(m) => service
            .get_bootstrap_token(&req, m)
            .await?
            .map(|r| to_plist_xml(&r))
            .transpose()?,
        CheckinMessage::DeclarativeManagement(m) => service.declarative_management(&req, m).await?,
        CheckinMessage::GetToken(m) => service
            .get_token(&req, m)
            .await?
            .map(|r| to_plist_xml(&r))
            .transpose()?,
    };

    Ok(body_response(response.unwrap_or_default()))
}

/// Handle command reports and deliver the next queued command.
pub async fn command_handler<S>(
    State(state): State<MdmState<S>>,
    Extension(TraceId(trace_id)): Extension<TraceId>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, HttpError>
where
    S: CommandAndReportResults,
{
    let req = device_request(&state, &headers, trace_id, params)?;
    let results = CommandResults::decode(&body)?;

    let next = state
        .service
        .command_and_report_results(&req, &results)
        .await?;

    Ok(body_response(next.map(|cmd| cmd.raw).unwrap_or_default()))
}

fn body_response(body: Vec<u8>) -> Response {
    if body.is_empty() {
        return StatusCode::OK.into_response();
    }
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// Build the request context, attaching the device certificate if one was
/// presented.
fn device_request<S>(
    state: &MdmState<S>,
    headers: &HeaderMap,
    trace_id: String,
    params: HashMap<String, String>,
) -> Result<Request, InputError> {
    let mut req = Request::new().with_trace_id(trace_id);
    req.params = params;

    let Some(der) = extract_certificate(headers)? else {
        return Ok(req);
    };
    if let Some(verifier) = &state.verifier {
        verifier
            .verify(&der)
            .map_err(|e| InputError::UntrustedCertificate(format!("{e:#}")))?;
    }
    let not_after = mdm_crypto::cert_not_after(&der).ok();

    Ok(req.with_certificate(DeviceCertificate { der, not_after }))
}

/// Extract the device certificate from request headers.
///
/// `Mdm-Signature` takes precedence over proxy-forwarded certificates.
pub fn extract_certificate(headers: &HeaderMap) -> Result<Option<Vec<u8>>, InputError> {
    let header_error =
        |e: color_eyre::eyre::Report| InputError::CertificateHeader(format!("{e:#}"));

    if let Some(sig) = headers.get("Mdm-Signature") {
        let sig = sig
            .to_str()
            .map_err(|e| InputError::CertificateHeader(e.to_string()))?;
        return mdm_crypto::signer_certificate(sig)
            .map(Some)
            .map_err(header_error);
    }

    for name in CERT_HEADERS {
        let Some(value) = headers.get(name) else {
            continue;
        };
        let value = value
            .to_str()
            .map_err(|e| InputError::CertificateHeader(e.to_string()))?;
        if value.is_empty() {
            continue;
        }

        let cert = if value.starts_with(':') {
            mdm_crypto::extract_rfc9440_cert(value)
        } else {
            mdm_crypto::extract_pem_header(value)
        };
        return cert.map(Some).map_err(header_error);
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_no_certificate_headers() {
        assert_eq!(extract_certificate(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_bad_certificate_header_is_input_error() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Ssl-Client-Cert", HeaderValue::from_static(":!!!:"));
        assert!(matches!(
            extract_certificate(&headers),
            Err(InputError::CertificateHeader(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert("Mdm-Signature", HeaderValue::from_static("not-cms"));
        assert!(matches!(
            extract_certificate(&headers),
            Err(InputError::CertificateHeader(_))
        ));
    }
}
