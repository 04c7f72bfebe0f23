//! Multi-service composition.

use std::future::Future;

use mdm_core::{
    Authenticate, BootstrapTokenResponse, CheckOut, Command, CommandResults, DeclarativeManagement,
    GetBootstrapToken, GetToken, GetTokenResponse, Request, SetBootstrapToken, TokenUpdate,
    UserAuthenticate,
};

use crate::{Checkin, CommandAndReportResults};

/// Compose multiple services - primary returns values, others run as side-effects.
///
/// Secondaries run concurrently with the primary. Their failures are logged
/// and never reach the caller.
pub struct MultiService<P, S> {
    primary: P,
    secondary: Vec<S>,
}

impl<P, S> MultiService<P, S> {
    /// Create a new multi-service with a primary and secondary services.
    pub fn new(primary: P, secondary: Vec<S>) -> Self {
        Self { primary, secondary }
    }

    /// Add a secondary service.
    pub fn with_secondary(mut self, service: S) -> Self {
        self.secondary.push(service);
        self
    }
}

async fn run_secondaries<'a, S, T, F, Fut>(secondaries: &'a [S], op: &'static str, call: F)
where
    F: Fn(&'a S) -> Fut,
    Fut: Future<Output = color_eyre::eyre::Result<T>>,
{
    let results = futures::future::join_all(secondaries.iter().map(call)).await;
    for (index, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            tracing::warn!(op, service = index + 1, error = %e, "secondary service failed");
        }
    }
}

impl<P: Checkin, S: Checkin> Checkin for MultiService<P, S> {
    async fn authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let (result, ()) = futures::join!(
            self.primary.authenticate(req, msg),
            run_secondaries(&self.secondary, "authenticate", |s| s.authenticate(req, msg)),
        );
        result
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        let (result, ()) = futures::join!(
            self.primary.token_update(req, msg),
            run_secondaries(&self.secondary, "token_update", |s| s.token_update(req, msg)),
        );
        result
    }

    async fn checkout(&self, req: &Request, msg: &CheckOut) -> color_eyre::eyre::Result<()> {
        let (result, ()) = futures::join!(
            self.primary.checkout(req, msg),
            run_secondaries(&self.secondary, "checkout", |s| s.checkout(req, msg)),
        );
        result
    }

    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        let (result, ()) = futures::join!(
            self.primary.user_authenticate(req, msg),
            run_secondaries(&self.secondary, "user_authenticate", |s| {
                s.user_authenticate(req, msg)
            }),
        );
        result
    }

    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let (result, ()) = futures::join!(
            self.primary.set_bootstrap_token(req, msg),
            run_secondaries(&self.secondary, "set_bootstrap_token", |s| {
                s.set_bootstrap_token(req, msg)
            }),
        );
        result
    }

    async fn get_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapTokenResponse>> {
        let (result, ()) = futures::join!(
            self.primary.get_bootstrap_token(req, msg),
            run_secondaries(&self.secondary, "get_bootstrap_token", |s| {
                s.get_bootstrap_token(req, msg)
            }),
        );
        result
    }

    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        let (result, ()) = futures::join!(
            self.primary.declarative_management(req, msg),
            run_secondaries(&self.secondary, "declarative_management", |s| {
                s.declarative_management(req, msg)
            }),
        );
        result
    }

    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<Option<GetTokenResponse>> {
        let (result, ()) = futures::join!(
            self.primary.get_token(req, msg),
            run_secondaries(&self.secondary, "get_token", |s| s.get_token(req, msg)),
        );
        result
    }
}

impl<P: CommandAndReportResults, S: CommandAndReportResults> CommandAndReportResults
    for MultiService<P, S>
{
    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let (command, ()) = futures::join!(
            self.primary.command_and_report_results(req, results),
            run_secondaries(&self.secondary, "command_and_report_results", |s| {
                s.command_and_report_results(req, results)
            }),
        );
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{device, enroll, file_store};
    use crate::{DeclarativeManagementHandler, MdmService, ServiceError, find_error};
    use mdm_storage::CheckinStore as _;

    struct Ok200;

    impl DeclarativeManagementHandler for Ok200 {
        async fn declarative_management(
            &self,
            _req: &Request,
            _msg: &DeclarativeManagement,
        ) -> color_eyre::eyre::Result<Vec<u8>> {
            Ok(b"ok".to_vec())
        }
    }

    #[tokio::test]
    async fn test_secondaries_receive_every_call() {
        let (_a, primary_store) = file_store();
        let (_b, secondary_store) = file_store();
        let multi = MultiService::new(
            MdmService::new(primary_store.clone()),
            vec![MdmService::new(secondary_store.clone())],
        );

        enroll(&multi, device()).await;
        assert!(primary_store.is_enabled("DEV-1").unwrap());
        assert!(secondary_store.is_enabled("DEV-1").unwrap());
    }

    #[tokio::test]
    async fn test_only_primary_result_propagates() {
        let (_a, primary_store) = file_store();
        let (_b, secondary_store) = file_store();
        let dm = DeclarativeManagement {
            enrollment: device(),
            ..Default::default()
        };

        let multi = MultiService::new(
            MdmService::new(primary_store.clone()).with_declarative_management(Ok200),
            vec![MdmService::new(secondary_store.clone())],
        );
        let body = multi
            .declarative_management(&Request::new(), &dm)
            .await
            .unwrap();
        assert_eq!(body.as_deref(), Some(b"ok".as_slice()));

        let reversed = MultiService::new(
            MdmService::new(primary_store),
            vec![MdmService::new(secondary_store).with_declarative_management(Ok200)],
        );
        let err = reversed
            .declarative_management(&Request::new(), &dm)
            .await
            .unwrap_err();
        assert!(matches!(
            find_error::<ServiceError>(&err),
            Some(ServiceError::Unsupported(_))
        ));
    }
}
