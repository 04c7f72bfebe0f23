//! MDM Service Layer
//!
//! Business logic for handling MDM check-ins and commands.

mod certauth;
mod error;
mod gettoken;
mod multi;
mod secrets;
mod service;
mod traits;
mod ua;

#[cfg(test)]
mod testutil;

pub use certauth::{CertAuthOptions, CertAuthService};
pub use error::{CertAuthError, SecretError, ServiceError, find_error};
pub use gettoken::StaticTokens;
pub use multi::MultiService;
pub use secrets::{SECRET_PREFIX, SecretExpander, StaticSecrets};
pub use service::MdmService;
pub use traits::*;
pub use ua::{EMPTY_DIGEST_CHALLENGE, UaService};
