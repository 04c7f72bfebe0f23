//! Push notification traits.

use std::collections::{BTreeMap, HashMap};

use mdm_core::{PushCert, PushInfo, PushResponse};

/// Sends notifications for a single APNs topic.
#[trait_variant::make(Send)]
pub trait PushProvider: Send + Sync {
    /// Push to every `(enrollment id, push info)` pair.
    ///
    /// Per-device failures go in the returned results. A topic-level error
    /// may accompany results for the ids sent before it.
    async fn push(&self, infos: &[(String, PushInfo)]) -> TopicPush;
}

/// What a provider sent for one topic.
#[derive(Debug, Default)]
pub struct TopicPush {
    pub results: HashMap<String, PushResponse>,
    /// Set when the topic stopped short of some ids.
    pub error: Option<color_eyre::eyre::Report>,
}

impl TopicPush {
    pub fn sent(results: HashMap<String, PushResponse>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    pub fn failed(error: color_eyre::eyre::Report) -> Self {
        Self {
            results: HashMap::new(),
            error: Some(error),
        }
    }
}

/// Builds providers from stored push certificates.
pub trait PushProviderFactory: Send + Sync {
    type Provider: PushProvider + 'static;

    fn new_provider(&self, cert: &PushCert) -> color_eyre::eyre::Result<Self::Provider>;
}

/// Pushes to enrollments by id.
#[trait_variant::make(Send)]
pub trait Pusher: Send + Sync {
    async fn push(&self, ids: &[String]) -> color_eyre::eyre::Result<PushReport>;
}

/// Per-enrollment outcome of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PushReport {
    pub results: BTreeMap<String, PushResponse>,
    /// Topics that failed as a whole.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub topic_errors: BTreeMap<String, String>,
}

impl PushReport {
    /// Whether any enrollment did not get its notification.
    pub fn is_partial(&self) -> bool {
        !self.topic_errors.is_empty() || self.results.values().any(|r| !r.is_success())
    }
}
