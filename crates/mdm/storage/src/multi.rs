//! Storage that mirrors writes to secondary backends.

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::*;
use mdm_core::{
    Authenticate, BootstrapTokenResponse, Command, CommandResults, GetBootstrapToken, PushCert,
    PushInfo, Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

/// Reads from the primary, writes to every backend.
///
/// Writes go to the primary first, then to each secondary in order on the
/// calling thread. Only the primary's result is returned; secondary failures
/// are logged and do not stop later secondaries.
#[derive(Clone)]
pub struct MultiStorage {
    primary: Arc<dyn AllStorage>,
    others: Vec<Arc<dyn AllStorage>>,
}

impl MultiStorage {
    pub fn new(primary: Arc<dyn AllStorage>, others: Vec<Arc<dyn AllStorage>>) -> Self {
        Self { primary, others }
    }

    fn fan_out<T, F>(&self, op: &'static str, f: F) -> color_eyre::eyre::Result<T>
    where
        F: Fn(&dyn AllStorage) -> color_eyre::eyre::Result<T>,
    {
        let result = f(self.primary.as_ref());
        for (index, other) in self.others.iter().enumerate() {
            if let Err(e) = f(other.as_ref()) {
                tracing::warn!(op, storage = index + 1, error = %e, "secondary storage failed");
            }
        }
        result
    }
}

impl CheckinStore for MultiStorage {
    fn store_authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        self.fan_out("store_authenticate", |s| s.store_authenticate(req, msg))
    }

    fn store_token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        self.fan_out("store_token_update", |s| s.store_token_update(req, msg))
    }

    fn store_user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<()> {
        self.fan_out("store_user_authenticate", |s| {
            s.store_user_authenticate(req, msg)
        })
    }

    fn disable(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        self.fan_out("disable", |s| s.disable(req))
    }

    fn is_enabled(&self, id: &str) -> color_eyre::eyre::Result<bool> {
        self.primary.is_enabled(id)
    }

    fn token_update_tally(&self, id: &str) -> color_eyre::eyre::Result<u32> {
        self.primary.token_update_tally(id)
    }
}

impl BootstrapTokenStore for MultiStorage {
    fn store_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        self.fan_out("store_bootstrap_token", |s| s.store_bootstrap_token(req, msg))
    }

    fn retrieve_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapTokenResponse>> {
        self.primary.retrieve_bootstrap_token(req, msg)
    }
}

impl CommandQueueStore for MultiStorage {
    fn enqueue_command(
        &self,
        ids: &[String],
        command: &Command,
    ) -> color_eyre::eyre::Result<EnqueueReport> {
        self.fan_out("enqueue_command", |s| s.enqueue_command(ids, command))
    }

    fn store_command_report(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<()> {
        self.fan_out("store_command_report", |s| {
            s.store_command_report(req, results)
        })
    }

    fn retrieve_next_command(
        &self,
        req: &Request,
        skip_not_now: bool,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        self.primary.retrieve_next_command(req, skip_not_now)
    }

    fn clear_queue(&self, req: &Request) -> color_eyre::eyre::Result<()> {
        self.fan_out("clear_queue", |s| s.clear_queue(req))
    }
}

impl CertAuthStore for MultiStorage {
    fn has_cert_hash(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        self.primary.has_cert_hash(req, hash)
    }

    fn enrollment_has_cert_hash(&self, req: &Request) -> color_eyre::eyre::Result<bool> {
        self.primary.enrollment_has_cert_hash(req)
    }

    fn is_cert_hash_associated(&self, req: &Request, hash: &str) -> color_eyre::eyre::Result<bool> {
        self.primary.is_cert_hash_associated(req, hash)
    }

    fn associate_cert_hash(
        &self,
        req: &Request,
        hash: &str,
        not_after: Option<chrono::DateTime<chrono::Utc>>,
    ) -> color_eyre::eyre::Result<()> {
        self.fan_out("associate_cert_hash", |s| {
            s.associate_cert_hash(req, hash, not_after)
        })
    }
}

impl PushInfoStore for MultiStorage {
    fn retrieve_push_info(
        &self,
        ids: &[String],
    ) -> color_eyre::eyre::Result<HashMap<String, PushInfo>> {
        self.primary.retrieve_push_info(ids)
    }
}

impl PushCertStore for MultiStorage {
    fn store_push_cert(
        &self,
        topic: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> color_eyre::eyre::Result<()> {
        self.fan_out("store_push_cert", |s| {
            s.store_push_cert(topic, cert_pem, key_pem)
        })
    }

    fn retrieve_push_cert(&self, topic: &str) -> color_eyre::eyre::Result<Option<PushCert>> {
        self.primary.retrieve_push_cert(topic)
    }

    fn is_push_cert_stale(&self, topic: &str, stale_token: &str) -> color_eyre::eyre::Result<bool> {
        self.primary.is_push_cert_stale(topic, stale_token)
    }
}
