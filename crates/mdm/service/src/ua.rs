//! UserAuthenticate handling.

use color_eyre::eyre::WrapErr as _;
use mdm_core::{Request, UserAuthenticate};
use mdm_storage::CheckinStore;

use crate::{ServiceError, UserAuthenticateHandler};

/// Response asking the device to send a second UserAuthenticate with a
/// DigestResponse.
pub const EMPTY_DIGEST_CHALLENGE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>DigestChallenge</key>
	<string></string>
</dict>
</plist>
"#;

/// Decides whether user channels may enroll.
///
/// Without the empty digest challenge every user channel is declined.
#[derive(Debug, Clone)]
pub struct UaService<S> {
    store: S,
    empty_digest_challenge: bool,
    store_rejected: bool,
}

impl<S> UaService<S> {
    pub fn new(store: S, empty_digest_challenge: bool, store_rejected: bool) -> Self {
        Self {
            store,
            empty_digest_challenge,
            store_rejected,
        }
    }
}

impl<S: CheckinStore> UserAuthenticateHandler for UaService<S> {
    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        if self.empty_digest_challenge || self.store_rejected {
            self.store
                .store_user_authenticate(req, msg)
                .wrap_err("failed to store user authenticate")?;
        }

        let id = req.require_enroll_id()?;
        if msg.digest_response.as_deref().is_some_and(|r| !r.is_empty()) {
            tracing::debug!(enrollment_id = %id, "accepting second UserAuthenticate");
            return Ok(None);
        }

        if self.empty_digest_challenge {
            tracing::info!(enrollment_id = %id, "sending empty DigestChallenge");
            return Ok(Some(EMPTY_DIGEST_CHALLENGE.to_vec()));
        }

        tracing::info!(enrollment_id = %id, "declining user channel");
        Err(ServiceError::UserDeclined.into())
    }
}
