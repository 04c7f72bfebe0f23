//! Error to HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use color_eyre::eyre::Report;

use mdm_core::{EnrollIdError, ProtocolError};
use mdm_service::{ServiceError, find_error};

/// Malformed input rejected at the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("invalid device certificate header: {0}")]
    CertificateHeader(String),
    #[error("device certificate rejected: {0}")]
    UntrustedCertificate(String),
    #[error("{0}")]
    Invalid(String),
}

/// Status code for an error report.
///
/// Authentication failures are deliberately reported as 500; 401 and 403
/// are never returned.
pub fn status_for(report: &Report) -> StatusCode {
    match find_error::<ServiceError>(report) {
        Some(ServiceError::UserDeclined) => return StatusCode::GONE,
        Some(ServiceError::InvalidGetToken(_)) => return StatusCode::BAD_REQUEST,
        Some(ServiceError::Unsupported(_)) | None => {}
    }

    if find_error::<ProtocolError>(report).is_some()
        || find_error::<EnrollIdError>(report).is_some()
        || find_error::<InputError>(report).is_some()
    {
        return StatusCode::BAD_REQUEST;
    }

    StatusCode::INTERNAL_SERVER_ERROR
}

/// Handler error: an eyre report rendered with [`status_for`].
#[derive(Debug)]
pub struct HttpError(pub Report);

impl<E> From<E> for HttpError
where
    E: Into<Report>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = ?self.0, %status, "request failed");
        } else {
            tracing::info!(error = %self.0, %status, "request rejected");
        }
        let reason = status.canonical_reason().unwrap_or_default();
        (status, reason).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::WrapErr as _;
    use mdm_service::CertAuthError;

    #[test]
    fn test_declined_is_gone() {
        let report = Report::new(ServiceError::UserDeclined).wrap_err("user authenticate");
        assert_eq!(status_for(&report), StatusCode::GONE);
    }

    #[test]
    fn test_client_errors() {
        let protocol: Report = ProtocolError::InvalidCommand("empty".into()).into();
        assert_eq!(status_for(&protocol), StatusCode::BAD_REQUEST);

        let id = Report::new(EnrollIdError::Missing).wrap_err("resolve");
        assert_eq!(status_for(&id), StatusCode::BAD_REQUEST);

        let token: Report = ServiceError::InvalidGetToken("x".into()).into();
        assert_eq!(status_for(&token), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_auth_failures_are_server_errors() {
        for e in [
            CertAuthError::MissingCert,
            CertAuthError::NoCertAssoc,
            CertAuthError::NoCertReuse,
        ] {
            let report = Report::new(e).wrap_err("cert auth");
            assert_eq!(status_for(&report), StatusCode::INTERNAL_SERVER_ERROR);
        }

        let unsupported: Report = ServiceError::Unsupported("GetToken").into();
        assert_eq!(status_for(&unsupported), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status_for(&color_eyre::eyre::eyre!("disk full")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
