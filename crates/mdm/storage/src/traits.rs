//! Storage traits.
//!
//! Every backend implements these with the same observable behavior; the
//! conformance suite in this crate runs against each of them.

use std::collections::{BTreeMap, HashMap};

use mdm_core::{
    Authenticate, BootstrapTokenResponse, Command, CommandResults, GetBootstrapToken, PushCert,
    PushInfo, Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

/// Check-in storage operations.
pub trait CheckinStore: Send + Sync {
    /// Store an Authenticate message. Clears any bootstrap token.
    fn store_authenticate(&self, req: &Request, msg: &Authenticate)
    -> color_eyre::eyre::Result<()>;

    /// Store a TokenUpdate message, bump the tally and enable the enrollment.
    fn store_token_update(&self, req: &Request, msg: &TokenUpdate)
    -> color_eyre::eyre::Result<()>;

    /// Store a UserAuthenticate message for audit.
    fn store_user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<()>;

    /// Disable a device enrollment and all of its user channels.
    ///
    /// Resets the token-update tally. Fails for user-channel requests.
    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()>;

    /// Whether an enrollment exists and is enabled.
    fn is_enabled(&self, id: &str) -> color_eyre::eyre::Result<bool>;

    /// Number of TokenUpdates since the last Authenticate or disable.
    fn token_update_tally(&self, id: &str) -> color_eyre::eyre::Result<u32>;
}

/// Bootstrap token storage.
pub trait BootstrapTokenStore: Send + Sync {
    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()>;

    /// Retrieve the stored token, `None` when there is none.
    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapTokenResponse>>;
}

/// Per-target outcome of a fan-out enqueue.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct EnqueueReport {
    pub command_uuid: String,
    pub enqueued: Vec<String>,
    pub failed: BTreeMap<String, String>,
}

impl EnqueueReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Command queue operations.
pub trait CommandQueueStore: Send + Sync {
    /// Queue a command for each target enrollment.
    ///
    /// Targets are committed independently; the report says which succeeded.
    fn enqueue_command(
        &self,
        ids: &[String],
        command: &Command,
    ) -> color_eyre::eyre::Result<EnqueueReport>;

    /// Store a device report and move the reported entry.
    ///
    /// Idle reports change nothing. A report for a command the store has never
    /// seen fails with [`crate::StorageError::UnknownCommand`].
    fn store_command_report(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<()>;

    /// Next command to deliver, honoring `req.consistency`.
    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>>;

    /// Deactivate every pending entry of a device and its user channels.
    ///
    /// Fails for user-channel requests.
    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()>;
}

/// Certificate association storage.
pub trait CertAuthStore: Send + Sync {
    /// Whether any enrollment is associated with `hash`.
    fn has_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool>;

    /// Whether the request's enrollment has any associated hash.
    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool>;

    /// Whether the request's enrollment is associated with exactly `hash`.
    fn is_cert_hash_associated(&self, req: &Request, hash: &str)
    -> color_eyre::eyre::Result<bool>;

    /// Associate `hash` with the request's enrollment, replacing any previous one.
    fn associate_cert_hash(
        &self,
        req: &Request,
        hash: &str,
        not_after: Option<chrono::DateTime<chrono::Utc>>,
    ) -> color_eyre::eyre::Result<()>;
}

/// Push info lookup.
pub trait PushInfoStore: Send + Sync {
    /// Push info for the enabled enrollments among `ids`; unknown ids are absent.
    fn retrieve_push_info(
        &self,
        ids: &[String],
    ) -> color_eyre::eyre::Result<HashMap<String, PushInfo>>;
}

/// Push certificate storage.
pub trait PushCertStore: Send + Sync {
    /// Store a push certificate, invalidating its previous stale token.
    fn store_push_cert(
        &self,
        topic: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> color_eyre::eyre::Result<()>;

    /// Get a push certificate by topic.
    fn retrieve_push_cert(&self, topic: &str) -> color_eyre::eyre::Result<Option<PushCert>>;

    /// Whether `stale_token` no longer matches the stored certificate.
    fn is_push_cert_stale(&self, topic: &str, stale_token: &str)
    -> color_eyre::eyre::Result<bool>;
}

/// Everything the check-in service needs.
pub trait CheckinStorage: CheckinStore + BootstrapTokenStore + CommandQueueStore {}

impl<T> CheckinStorage for T where T: CheckinStore + BootstrapTokenStore + CommandQueueStore {}

/// Everything the push service needs.
pub trait PushStorage: PushInfoStore + PushCertStore {}

impl<T> PushStorage for T where T: PushInfoStore + PushCertStore {}

/// Combined storage trait.
pub trait AllStorage: CheckinStorage + PushStorage + CertAuthStore {}

impl<T> AllStorage for T where T: CheckinStorage + PushStorage + CertAuthStore {}
