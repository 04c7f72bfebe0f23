//! Service errors.

/// Certificate authentication failures.
///
/// None of these map to an authentication-rejection transport status.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CertAuthError {
    #[error("missing certificate")]
    MissingCert,
    #[error("no prior certificate association")]
    NoCertAssoc,
    #[error("certificate reuse not allowed")]
    NoCertReuse,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ServiceError {
    /// No handler is configured for this message type.
    #[error("{0} not supported")]
    Unsupported(&'static str),
    #[error("invalid GetToken request: {0}")]
    InvalidGetToken(String),
    /// Management of this user channel is declined.
    #[error("user authentication declined")]
    UserDeclined,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("unknown secret {0}")]
    Unknown(String),
}

/// Find an error of type `E` anywhere in a report's cause chain.
pub fn find_error<E>(report: &color_eyre::eyre::Report) -> Option<&E>
where
    E: std::error::Error + 'static,
{
    report.chain().find_map(|e| e.downcast_ref::<E>())
}
