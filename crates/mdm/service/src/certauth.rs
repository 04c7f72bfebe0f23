//! Certificate authentication middleware.
//!
//! Binds the device identity certificate to an enrollment on Authenticate
//! and checks every later message against that binding.

use color_eyre::eyre::WrapErr as _;
use mdm_core::{
    Authenticate, BootstrapTokenResponse, CheckOut, Command, CommandResults, DeclarativeManagement,
    Enrollment, GetBootstrapToken, GetToken, GetTokenResponse, IdPolicy, Request,
    SetBootstrapToken, TokenUpdate, UserAuthenticate,
};
use mdm_storage::CertAuthStore;

use crate::{CertAuthError, Checkin, CommandAndReportResults};

/// Certificate association policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct CertAuthOptions {
    /// Let several enrollments share one certificate.
    pub allow_dup: bool,
    /// Associate certificates of enrollments that predate this middleware.
    pub allow_retroactive: bool,
    /// Log violations instead of rejecting them.
    pub warn_only: bool,
}

/// Certificate authentication service wrapper.
pub struct CertAuthService<S, I> {
    store: S,
    inner: I,
    options: CertAuthOptions,
}

impl<S, I> CertAuthService<S, I> {
    /// Create a new cert auth service.
    pub fn new(store: S, inner: I, options: CertAuthOptions) -> Self {
        Self {
            store,
            inner,
            options,
        }
    }
}

impl<S, I> CertAuthService<S, I>
where
    S: CertAuthStore,
{
    /// Device-channel request and certificate hash for a message.
    ///
    /// Associations are tracked per device, so user channels share the
    /// device's certificate.
    fn identify(
        &self,
        req: &Request,
        enrollment: &Enrollment,
    ) -> color_eyre::eyre::Result<(Request, String, Option<chrono::DateTime<chrono::Utc>>)> {
        let cert = req.certificate.as_ref().ok_or(CertAuthError::MissingCert)?;
        let req = req
            .for_enrollment(enrollment, IdPolicy::Flat)
            .wrap_err("invalid enrollment")?;
        Ok((req, mdm_crypto::cert_hash(&cert.der), cert.not_after))
    }

    fn associate_new(
        &self,
        req: &Request,
        enrollment: &Enrollment,
    ) -> color_eyre::eyre::Result<()> {
        let (req, hash, not_after) = self.identify(req, enrollment)?;
        let id = req.require_enroll_id()?;

        if self.store.is_cert_hash_associated(&req, &hash)? {
            return Ok(());
        }

        if !self.options.allow_dup && self.store.has_cert_hash(&req, &hash)? {
            tracing::warn!(
                enrollment_id = %id,
                trace_id = req.trace_id(),
                hash = %hash,
                "certificate already associated with another enrollment"
            );
            if !self.options.warn_only {
                return Err(CertAuthError::NoCertReuse.into());
            }
        }

        self.store
            .associate_cert_hash(&req, &hash, not_after)
            .wrap_err("failed to associate certificate")?;
        tracing::info!(enrollment_id = %id, hash = %hash, "certificate associated");

        Ok(())
    }

    fn validate_existing(
        &self,
        req: &Request,
        enrollment: &Enrollment,
    ) -> color_eyre::eyre::Result<()> {
        let (req, hash, not_after) = self.identify(req, enrollment)?;
        let id = req.require_enroll_id()?;

        if self.store.is_cert_hash_associated(&req, &hash)? {
            return Ok(());
        }

        if !self.options.allow_retroactive {
            tracing::warn!(
                enrollment_id = %id,
                trace_id = req.trace_id(),
                hash = %hash,
                "no certificate association"
            );
            if !self.options.warn_only {
                return Err(CertAuthError::NoCertAssoc.into());
            }
        }

        // Retroactive association never replaces an existing binding.
        if self.store.enrollment_has_cert_hash(&req)? {
            tracing::warn!(
                enrollment_id = %id,
                trace_id = req.trace_id(),
                hash = %hash,
                "enrollment is associated with a different certificate"
            );
            if !self.options.warn_only {
                return Err(CertAuthError::NoCertReuse.into());
            }
        }

        if self.store.has_cert_hash(&req, &hash)? {
            tracing::warn!(
                enrollment_id = %id,
                trace_id = req.trace_id(),
                hash = %hash,
                "certificate already associated with another enrollment"
            );
            if !self.options.warn_only {
                return Err(CertAuthError::NoCertReuse.into());
            }
        }

        if self.options.warn_only {
            return Ok(());
        }

        self.store
            .associate_cert_hash(&req, &hash, not_after)
            .wrap_err("failed to associate certificate")?;
        tracing::info!(enrollment_id = %id, hash = %hash, "certificate associated retroactively");

        Ok(())
    }
}

impl<S: CertAuthStore, I: Checkin> Checkin for CertAuthService<S, I> {
    async fn authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        self.associate_new(req, &msg.enrollment)?;
        self.inner.authenticate(req, msg).await
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        self.validate_existing(req, &msg.enrollment)?;
        self.inner.token_update(req, msg).await
    }

    async fn checkout(&self, req: &Request, msg: &CheckOut) -> color_eyre::eyre::Result<()> {
        self.validate_existing(req, &msg.enrollment)?;
        self.inner.checkout(req, msg).await
    }

    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        self.validate_existing(req, &msg.enrollment)?;
        self.inner.user_authenticate(req, msg).await
    }

    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        self.validate_existing(req, &msg.enrollment)?;
        self.inner.set_bootstrap_token(req, msg).await
    }

    async fn get_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapTokenResponse>> {
        self.validate_existing(req, &msg.enrollment)?;
        self.inner.get_bootstrap_token(req, msg).await
    }

    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        self.validate_existing(req, &msg.enrollment)?;
        self.inner.declarative_management(req, msg).await
    }

    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<Option<GetTokenResponse>> {
        self.validate_existing(req, &msg.enrollment)?;
        self.inner.get_token(req, msg).await
    }
}

impl<S: CertAuthStore, I: CommandAndReportResults> CommandAndReportResults
    for CertAuthService<S, I>
{
    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        self.validate_existing(req, &results.enrollment)?;
        self.inner.command_and_report_results(req, results).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MdmService;
    use crate::find_error;
    use crate::testutil::{file_store, report};
    use mdm_core::{CommandStatus, DeviceCertificate};
    use mdm_storage::{CheckinStore as _, FileStorage};

    type Service = CertAuthService<FileStorage, MdmService<FileStorage>>;

    fn service(store: &FileStorage, options: CertAuthOptions) -> Service {
        CertAuthService::new(store.clone(), MdmService::new(store.clone()), options)
    }

    fn with_cert(der: &[u8]) -> Request {
        Request::new().with_certificate(DeviceCertificate {
            der: der.to_vec(),
            not_after: None,
        })
    }

    fn enrollment(udid: &str) -> Enrollment {
        Enrollment {
            udid: Some(udid.into()),
            ..Default::default()
        }
    }

    fn authenticate(udid: &str) -> Authenticate {
        Authenticate {
            enrollment: enrollment(udid),
            topic: "com.apple.mgmt.External.test".into(),
            ..Default::default()
        }
    }

    fn token_update(udid: &str) -> TokenUpdate {
        TokenUpdate {
            enrollment: enrollment(udid),
            token: vec![1, 2, 3],
            ..Default::default()
        }
    }

    fn cert_error(err: &color_eyre::eyre::Report) -> Option<&CertAuthError> {
        find_error::<CertAuthError>(err)
    }

    #[tokio::test]
    async fn test_authenticate_associates_and_later_messages_pass() {
        let (_dir, store) = file_store();
        let service = service(&store, CertAuthOptions::default());

        service
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-1"))
            .await
            .unwrap();
        service
            .token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap();
        assert!(store.is_enabled("DEV-1").unwrap());

        // Re-authenticating with the same certificate is idempotent.
        service
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_certificate_is_rejected() {
        let (_dir, store) = file_store();
        let service = service(&store, CertAuthOptions::default());
        service
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-1"))
            .await
            .unwrap();

        let err = service
            .token_update(&with_cert(b"cert-b"), &token_update("DEV-1"))
            .await
            .unwrap_err();
        assert_eq!(cert_error(&err), Some(&CertAuthError::NoCertAssoc));
    }

    #[tokio::test]
    async fn test_certificate_reuse_across_devices() {
        let (_dir, store) = file_store();
        let strict = service(&store, CertAuthOptions::default());
        strict
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-1"))
            .await
            .unwrap();

        let err = strict
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-2"))
            .await
            .unwrap_err();
        assert_eq!(cert_error(&err), Some(&CertAuthError::NoCertReuse));

        let lenient = service(
            &store,
            CertAuthOptions {
                allow_dup: true,
                ..Default::default()
            },
        );
        lenient
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_certificate_always_fails() {
        let (_dir, store) = file_store();
        let service = service(
            &store,
            CertAuthOptions {
                warn_only: true,
                ..Default::default()
            },
        );

        let err = service
            .authenticate(&Request::new(), &authenticate("DEV-1"))
            .await
            .unwrap_err();
        assert_eq!(cert_error(&err), Some(&CertAuthError::MissingCert));
    }

    #[tokio::test]
    async fn test_retroactive_association() {
        let (_dir, store) = file_store();

        // An enrollment that predates certificate tracking.
        let plain = MdmService::new(store.clone());
        plain
            .authenticate(&Request::new(), &authenticate("DEV-1"))
            .await
            .unwrap();

        let strict = service(&store, CertAuthOptions::default());
        let err = strict
            .token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap_err();
        assert_eq!(cert_error(&err), Some(&CertAuthError::NoCertAssoc));

        let retroactive = service(
            &store,
            CertAuthOptions {
                allow_retroactive: true,
                ..Default::default()
            },
        );
        retroactive
            .token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap();

        // The binding is now fixed; no retroactive spoofing with another cert.
        let err = retroactive
            .token_update(&with_cert(b"cert-b"), &token_update("DEV-1"))
            .await
            .unwrap_err();
        assert_eq!(cert_error(&err), Some(&CertAuthError::NoCertReuse));
        strict
            .token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_warn_only_never_associates_existing() {
        let (_dir, store) = file_store();
        let warn = service(
            &store,
            CertAuthOptions {
                warn_only: true,
                ..Default::default()
            },
        );
        MdmService::new(store.clone())
            .authenticate(&Request::new(), &authenticate("DEV-1"))
            .await
            .unwrap();

        warn.token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap();

        let strict = service(&store, CertAuthOptions::default());
        let err = strict
            .token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap_err();
        assert_eq!(cert_error(&err), Some(&CertAuthError::NoCertAssoc));
    }

    #[tokio::test]
    async fn test_warn_only_admits_new_cert_without_rebinding() {
        let (_dir, store) = file_store();
        let strict = service(&store, CertAuthOptions::default());
        strict
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-1"))
            .await
            .unwrap();

        // Warn-only never blocks, even where retroactive binding would refuse.
        let warn = service(
            &store,
            CertAuthOptions {
                warn_only: true,
                allow_retroactive: true,
                ..Default::default()
            },
        );
        warn.token_update(&with_cert(b"cert-b"), &token_update("DEV-1"))
            .await
            .unwrap();

        // The original binding is untouched.
        strict
            .token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap();
        let err = strict
            .token_update(&with_cert(b"cert-b"), &token_update("DEV-1"))
            .await
            .unwrap_err();
        assert_eq!(cert_error(&err), Some(&CertAuthError::NoCertAssoc));
    }

    #[tokio::test]
    async fn test_user_channel_uses_device_association() {
        let (_dir, store) = file_store();
        let service = service(&store, CertAuthOptions::default());
        service
            .authenticate(&with_cert(b"cert-a"), &authenticate("DEV-1"))
            .await
            .unwrap();
        service
            .token_update(&with_cert(b"cert-a"), &token_update("DEV-1"))
            .await
            .unwrap();

        let user = TokenUpdate {
            enrollment: Enrollment {
                udid: Some("DEV-1".into()),
                user_id: Some("USER-1".into()),
                ..Default::default()
            },
            token: vec![4],
            ..Default::default()
        };
        service
            .token_update(&with_cert(b"cert-a"), &user)
            .await
            .unwrap();
        assert!(store.is_enabled("DEV-1:USER-1").unwrap());

        service
            .command_and_report_results(&with_cert(b"cert-a"), &report("", CommandStatus::Idle))
            .await
            .unwrap();
    }
}
