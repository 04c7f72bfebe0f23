//! APNs push implementation using the a2 crate.

use a2::NotificationBuilder as _;
use color_eyre::eyre::WrapErr as _;
use mdm_core::{PushCert, PushInfo, PushResponse};

use crate::{PushProvider, PushProviderFactory, TopicPush};

/// APNs provider for one push certificate.
pub struct ApnsProvider {
    client: a2::Client,
}

impl ApnsProvider {
    /// Create a provider from a PEM certificate and key.
    pub fn new(cert: &PushCert, endpoint: a2::Endpoint) -> color_eyre::eyre::Result<Self> {
        let client = a2::Client::certificate_parts(
            cert.cert_pem.as_bytes(),
            cert.key_pem.as_bytes(),
            a2::ClientConfig::new(endpoint),
        )
        .wrap_err("failed to create APNs client")?;

        Ok(Self { client })
    }

    async fn push_single(&self, info: &PushInfo) -> PushResponse {
        // MDM wake-up payload is {"mdm": "<push magic>"}
        let token = info.token_hex();
        let mut payload = a2::DefaultNotificationBuilder::new().build(
            &token,
            a2::NotificationOptions {
                apns_topic: Some(info.topic.as_str()),
                ..Default::default()
            },
        );
        if let Err(e) = payload.add_custom_data("mdm", &info.push_magic) {
            return PushResponse::failure(e);
        }

        match self.client.send(payload).await {
            Ok(response) => PushResponse::success(response.apns_id.unwrap_or_default()),
            Err(e) => PushResponse::failure(e),
        }
    }
}

impl PushProvider for ApnsProvider {
    async fn push(&self, infos: &[(String, PushInfo)]) -> TopicPush {
        let sends = infos.iter().map(|(id, info)| async move {
            let response = self.push_single(info).await;
            if let Some(error) = &response.error {
                tracing::warn!(enrollment_id = %id, topic = %info.topic, error, "push failed");
            }
            (id.clone(), response)
        });

        TopicPush::sent(futures::future::join_all(sends).await.into_iter().collect())
    }
}

/// Builds [`ApnsProvider`]s for production or sandbox APNs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApnsProviderFactory {
    sandbox: bool,
}

impl ApnsProviderFactory {
    pub fn new(sandbox: bool) -> Self {
        Self { sandbox }
    }
}

impl PushProviderFactory for ApnsProviderFactory {
    type Provider = ApnsProvider;

    fn new_provider(&self, cert: &PushCert) -> color_eyre::eyre::Result<ApnsProvider> {
        let endpoint = if self.sandbox {
            a2::Endpoint::Sandbox
        } else {
            a2::Endpoint::Production
        };
        tracing::info!(topic = %cert.topic, sandbox = self.sandbox, "creating APNs client");
        ApnsProvider::new(cert, endpoint)
    }
}
