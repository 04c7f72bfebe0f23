//! Core check-in and command service.

use std::sync::Arc;

use color_eyre::eyre::WrapErr as _;
use mdm_core::{
    Authenticate, BootstrapTokenResponse, CheckOut, Command, CommandResults, CommandStatus,
    Consistency, DeclarativeManagement, Enrollment, GetBootstrapToken, GetToken, GetTokenResponse,
    IdPolicy, Request, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};
use mdm_storage::{CheckinStorage, StorageError};

use crate::{
    Checkin, CommandAndReportResults, DeclarativeManagementHandler, GetTokenHandler,
    SecretExpander, Unsupported, UserAuthenticateHandler,
};

/// Core MDM service.
///
/// Normalizes every message to a composite enrollment id, keeps enrollment
/// state in storage and hands the optional message types to injected
/// handlers.
#[derive(Clone)]
pub struct MdmService<S, D = Unsupported, U = Unsupported, G = Unsupported> {
    store: S,
    dm: D,
    ua: U,
    get_token: G,
    secrets: Option<Arc<dyn SecretExpander>>,
}

impl<S> MdmService<S> {
    /// Create a service with no optional handlers.
    pub fn new(store: S) -> Self {
        Self {
            store,
            dm: Unsupported,
            ua: Unsupported,
            get_token: Unsupported,
            secrets: None,
        }
    }
}

impl<S, D, U, G> MdmService<S, D, U, G> {
    pub fn with_declarative_management<D2>(self, dm: D2) -> MdmService<S, D2, U, G> {
        MdmService {
            store: self.store,
            dm,
            ua: self.ua,
            get_token: self.get_token,
            secrets: self.secrets,
        }
    }

    pub fn with_user_authenticate<U2>(self, ua: U2) -> MdmService<S, D, U2, G> {
        MdmService {
            store: self.store,
            dm: self.dm,
            ua,
            get_token: self.get_token,
            secrets: self.secrets,
        }
    }

    pub fn with_get_token<G2>(self, get_token: G2) -> MdmService<S, D, U, G2> {
        MdmService {
            store: self.store,
            dm: self.dm,
            ua: self.ua,
            get_token,
            secrets: self.secrets,
        }
    }

    /// Expand secret placeholders in delivered commands.
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretExpander>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Request copy identified by the message's composite enrollment id.
    fn enrolled(
        &self,
        req: &Request,
        enrollment: &Enrollment,
    ) -> color_eyre::eyre::Result<Request> {
        req.for_enrollment(enrollment, IdPolicy::Composite)
            .wrap_err("invalid enrollment")
    }

    /// Expand secrets, delivering the command unexpanded if that fails.
    fn expand_secrets(&self, req: &Request, command: Command) -> Command {
        let Some(secrets) = &self.secrets else {
            return command;
        };
        match secrets.expand(&command.raw) {
            Ok(raw) => Command { raw, ..command },
            Err(e) => {
                tracing::warn!(
                    trace_id = req.trace_id(),
                    command_uuid = %command.command_uuid,
                    error = %e,
                    "secret expansion failed, delivering command unexpanded"
                );
                command
            }
        }
    }
}

impl<S, D, U, G> Checkin for MdmService<S, D, U, G>
where
    S: CheckinStorage,
    D: DeclarativeManagementHandler,
    U: UserAuthenticateHandler,
    G: GetTokenHandler,
{
    async fn authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(
            enrollment_id = %id,
            trace_id = req.trace_id(),
            serial_number = ?msg.serial_number,
            "Authenticate"
        );

        self.store
            .store_authenticate(&req, msg)
            .wrap_err("failed to store authenticate")?;

        // A fresh enrollment starts with an empty queue and stays disabled
        // until its first TokenUpdate.
        self.store
            .clear_queue(&req)
            .wrap_err("failed to clear command queue")?;
        self.store
            .disable(&req)
            .wrap_err("failed to disable enrollment")?;

        Ok(())
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(
            enrollment_id = %id,
            trace_id = req.trace_id(),
            topic = %msg.topic,
            awaiting_configuration = msg.awaiting_configuration,
            "TokenUpdate"
        );

        self.store
            .store_token_update(&req, msg)
            .wrap_err("failed to store token update")?;

        Ok(())
    }

    async fn checkout(&self, req: &Request, msg: &CheckOut) -> color_eyre::eyre::Result<()> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(enrollment_id = %id, trace_id = req.trace_id(), "CheckOut");

        self.store
            .disable(&req)
            .wrap_err("failed to disable enrollment")?;

        Ok(())
    }

    async fn user_authenticate(
        &self,
        req: &Request,
        msg: &UserAuthenticate,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(
            enrollment_id = %id,
            trace_id = req.trace_id(),
            digest_response = msg.digest_response.is_some(),
            "UserAuthenticate"
        );

        self.ua.user_authenticate(&req, msg).await
    }

    async fn set_bootstrap_token(
        &self,
        req: &Request,
        msg: &SetBootstrapToken,
    ) -> color_eyre::eyre::Result<()> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(enrollment_id = %id, trace_id = req.trace_id(), "SetBootstrapToken");

        self.store
            .store_bootstrap_token(&req, msg)
            .wrap_err("failed to store bootstrap token")?;

        Ok(())
    }

    async fn get_bootstrap_token(
        &self,
        req: &Request,
        msg: &GetBootstrapToken,
    ) -> color_eyre::eyre::Result<Option<BootstrapTokenResponse>> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(enrollment_id = %id, trace_id = req.trace_id(), "GetBootstrapToken");

        let token = self
            .store
            .retrieve_bootstrap_token(&req, msg)
            .wrap_err("failed to retrieve bootstrap token")?;
        if token.is_none() {
            tracing::debug!(enrollment_id = %id, "no bootstrap token stored");
        }

        Ok(token)
    }

    async fn declarative_management(
        &self,
        req: &Request,
        msg: &DeclarativeManagement,
    ) -> color_eyre::eyre::Result<Option<Vec<u8>>> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(
            enrollment_id = %id,
            trace_id = req.trace_id(),
            endpoint = ?msg.endpoint,
            "DeclarativeManagement"
        );

        self.dm.declarative_management(&req, msg).await.map(Some)
    }

    async fn get_token(
        &self,
        req: &Request,
        msg: &GetToken,
    ) -> color_eyre::eyre::Result<Option<GetTokenResponse>> {
        let req = self.enrolled(req, &msg.enrollment)?;
        let id = req.require_enroll_id()?;

        tracing::info!(
            enrollment_id = %id,
            trace_id = req.trace_id(),
            service_type = %msg.token_service_type,
            "GetToken"
        );

        self.get_token.get_token(&req, msg).await.map(Some)
    }
}

impl<S, D, U, G> CommandAndReportResults for MdmService<S, D, U, G>
where
    S: CheckinStorage,
    D: Send + Sync,
    U: Send + Sync,
    G: Send + Sync,
{
    async fn command_and_report_results(
        &self,
        req: &Request,
        results: &CommandResults,
    ) -> color_eyre::eyre::Result<Option<Command>> {
        let mut req = self.enrolled(req, &results.enrollment)?;
        let id = req.require_enroll_id()?.clone();

        tracing::info!(
            enrollment_id = %id,
            trace_id = req.trace_id(),
            command_uuid = %results.command_uuid,
            status = %results.status,
            "CommandAndReportResults"
        );

        if let Err(e) = self.store.store_command_report(&req, results) {
            match StorageError::find(&e) {
                Some(StorageError::UnknownCommand(uuid)) => tracing::warn!(
                    enrollment_id = %id,
                    command_uuid = %uuid,
                    "report for unknown command"
                ),
                _ => return Err(e.wrap_err("failed to store command report")),
            }
        }

        // The report write must be visible to the fetch below.
        if !results.is_idle() {
            req.consistency = Consistency::Primary;
        }

        let next = self
            .store
            .retrieve_next_command(&req, results.status == CommandStatus::NotNow)
            .wrap_err("failed to retrieve next command")?;

        let Some(command) = next else {
            tracing::debug!(enrollment_id = %id, "no command queued");
            return Ok(None);
        };

        tracing::info!(
            enrollment_id = %id,
            command_uuid = %command.command_uuid,
            request_type = %command.request_type,
            "sending next command"
        );

        Ok(Some(self.expand_secrets(&req, command)))
    }
}
