//! Push dispatch with a per-topic provider cache.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use color_eyre::eyre::WrapErr as _;
use mdm_core::{PushInfo, PushResponse};
use mdm_storage::PushStorage;

use crate::{PushProvider, PushProviderFactory, PushReport, Pusher, TopicPush};

struct CachedProvider<P> {
    provider: Arc<P>,
    stale_token: String,
}

/// Resolves enrollment ids to push info and pushes through cached providers.
///
/// A provider is rebuilt whenever its topic's certificate changes.
pub struct PushService<S, F: PushProviderFactory> {
    store: S,
    factory: F,
    providers: RwLock<BTreeMap<String, CachedProvider<F::Provider>>>,
}

impl<S, F> PushService<S, F>
where
    S: PushStorage,
    F: PushProviderFactory,
{
    /// Create a new push service.
    pub fn new(store: S, factory: F) -> Self {
        Self {
            store,
            factory,
            providers: RwLock::new(BTreeMap::new()),
        }
    }

    fn provider(&self, topic: &str) -> color_eyre::eyre::Result<Arc<F::Provider>> {
        let cached = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(|c| (Arc::clone(&c.provider), c.stale_token.clone()));

        if let Some((provider, stale_token)) = cached {
            if !self.store.is_push_cert_stale(topic, &stale_token)? {
                return Ok(provider);
            }
            tracing::info!(topic, "push certificate changed");
        }

        let cert = self
            .store
            .retrieve_push_cert(topic)?
            .ok_or_else(|| color_eyre::eyre::eyre!("no push certificate for topic {topic}"))?;
        let provider = Arc::new(
            self.factory
                .new_provider(&cert)
                .wrap_err_with(|| format!("failed to create push provider for {topic}"))?,
        );

        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                topic.to_string(),
                CachedProvider {
                    provider: Arc::clone(&provider),
                    stale_token: cert.stale_token,
                },
            );
        tracing::debug!(topic, "push provider created");

        Ok(provider)
    }

    async fn push_topic(&self, topic: &str, infos: &[(String, PushInfo)]) -> TopicPush {
        match self.provider(topic) {
            Ok(provider) => provider.push(infos).await,
            Err(e) => TopicPush::failed(e),
        }
    }
}

impl<S, F> Pusher for PushService<S, F>
where
    S: PushStorage,
    F: PushProviderFactory,
{
    async fn push(&self, ids: &[String]) -> color_eyre::eyre::Result<PushReport> {
        let infos = self
            .store
            .retrieve_push_info(ids)
            .wrap_err("failed to retrieve push info")?;

        let mut report = PushReport::default();
        let mut by_topic: BTreeMap<String, Vec<(String, PushInfo)>> = BTreeMap::new();
        for id in ids {
            match infos.get(id) {
                Some(info) => by_topic
                    .entry(info.topic.clone())
                    .or_default()
                    .push((id.clone(), info.clone())),
                None => {
                    report
                        .results
                        .insert(id.clone(), PushResponse::failure("no push info"));
                }
            }
        }

        let outcomes = if by_topic.len() == 1 {
            let mut outcomes = Vec::with_capacity(1);
            for (topic, infos) in &by_topic {
                outcomes.push((topic.as_str(), self.push_topic(topic, infos).await));
            }
            outcomes
        } else {
            futures::future::join_all(by_topic.iter().map(|(topic, infos)| async move {
                (topic.as_str(), self.push_topic(topic, infos).await)
            }))
            .await
        };

        let topic_count = outcomes.len();
        let mut last_error = None;
        for (topic, outcome) in outcomes {
            report.results.extend(outcome.results);
            if let Some(e) = outcome.error {
                tracing::warn!(topic, error = %e, "push failed for topic");
                // Ids the provider already answered for keep their own result.
                for (id, _) in by_topic.get(topic).into_iter().flatten() {
                    report
                        .results
                        .entry(id.clone())
                        .or_insert_with(|| PushResponse::failure(&e));
                }
                report.topic_errors.insert(topic.to_string(), format!("{e:#}"));
                last_error = Some(e);
            }
        }

        let delivered = report.results.values().filter(|r| r.is_success()).count();
        if report.topic_errors.len() == topic_count && delivered == 0 {
            if let Some(e) = last_error {
                return Err(e.wrap_err("push failed for every topic"));
            }
        }

        tracing::info!(
            requested = ids.len(),
            delivered,
            topics = topic_count,
            "push complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use mdm_core::{EnrollId, EnrollType, PushCert, Request, TokenUpdate};
    use mdm_storage::{CheckinStore as _, FileStorage, PushCertStore as _};

    struct MockProvider {
        fail: bool,
        /// Drop the connection after this many sends.
        cut_after: Option<usize>,
        generation: String,
    }

    impl PushProvider for MockProvider {
        async fn push(&self, infos: &[(String, PushInfo)]) -> TopicPush {
            if self.fail {
                return TopicPush::failed(color_eyre::eyre::eyre!("apns unavailable"));
            }
            let sent = self.cut_after.unwrap_or(infos.len()).min(infos.len());
            let results: HashMap<_, _> = infos[..sent]
                .iter()
                .map(|(id, info)| {
                    let resp = if info.push_magic.is_empty() {
                        PushResponse::failure("BadDeviceToken")
                    } else {
                        PushResponse::success(format!("{}/{id}", self.generation))
                    };
                    (id.clone(), resp)
                })
                .collect();
            TopicPush {
                results,
                error: (sent < infos.len())
                    .then(|| color_eyre::eyre::eyre!("connection reset")),
            }
        }
    }

    #[derive(Default)]
    struct MockFactory {
        builds: Arc<AtomicUsize>,
        failing_topics: HashSet<String>,
        cut_topics: HashSet<String>,
    }

    impl PushProviderFactory for MockFactory {
        type Provider = MockProvider;

        fn new_provider(&self, cert: &PushCert) -> color_eyre::eyre::Result<MockProvider> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(MockProvider {
                fail: self.failing_topics.contains(&cert.topic),
                cut_after: self.cut_topics.contains(&cert.topic).then_some(1),
                generation: cert.cert_pem.clone(),
            })
        }
    }

    fn store() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path()).unwrap();
        (dir, store)
    }

    fn enroll(store: &FileStorage, id: &str, topic: &str, push_magic: &str) {
        let req = Request::new().with_enroll_id(EnrollId::device(EnrollType::Device, id));
        let msg = TokenUpdate {
            topic: topic.into(),
            token: vec![0xAB, 0xCD],
            push_magic: push_magic.into(),
            ..Default::default()
        };
        store.store_token_update(&req, &msg).unwrap();
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_single_topic_with_missing_id() {
        let (_dir, store) = store();
        store.store_push_cert("topic.a", "gen1", "key").unwrap();
        enroll(&store, "DEV-1", "topic.a", "magic");

        let service = PushService::new(store, MockFactory::default());
        let report = service.push(&ids(&["DEV-1", "NOPE"])).await.unwrap();

        assert_eq!(report.results["DEV-1"], PushResponse::success("gen1/DEV-1"));
        assert!(!report.results["NOPE"].is_success());
        assert!(report.topic_errors.is_empty());
        assert!(report.is_partial());
    }

    #[tokio::test]
    async fn test_provider_cached_until_cert_changes() {
        let (_dir, store) = store();
        store.store_push_cert("topic.a", "gen1", "key").unwrap();
        enroll(&store, "DEV-1", "topic.a", "magic");
        let factory = MockFactory::default();
        let builds = Arc::clone(&factory.builds);
        let service = PushService::new(store.clone(), factory);

        service.push(&ids(&["DEV-1"])).await.unwrap();
        service.push(&ids(&["DEV-1"])).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        store.store_push_cert("topic.a", "gen2", "key").unwrap();
        let report = service.push(&ids(&["DEV-1"])).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(report.results["DEV-1"], PushResponse::success("gen2/DEV-1"));
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn test_partial_failure_across_topics() {
        let (_dir, store) = store();
        store.store_push_cert("topic.a", "gen1", "key").unwrap();
        store.store_push_cert("topic.b", "gen1", "key").unwrap();
        enroll(&store, "DEV-1", "topic.a", "magic");
        enroll(&store, "DEV-2", "topic.a", "");
        enroll(&store, "DEV-3", "topic.b", "magic");
        let factory = MockFactory {
            failing_topics: HashSet::from(["topic.b".to_string()]),
            ..Default::default()
        };

        let service = PushService::new(store, factory);
        let report = service
            .push(&ids(&["DEV-1", "DEV-2", "DEV-3"]))
            .await
            .unwrap();

        assert!(report.results["DEV-1"].is_success());
        assert_eq!(
            report.results["DEV-2"],
            PushResponse::failure("BadDeviceToken")
        );
        assert!(!report.results["DEV-3"].is_success());
        assert_eq!(report.topic_errors.len(), 1);
        assert!(report.topic_errors.contains_key("topic.b"));
        assert!(report.is_partial());
    }

    #[tokio::test]
    async fn test_topic_error_keeps_results_already_sent() {
        let (_dir, store) = store();
        store.store_push_cert("topic.a", "gen1", "key").unwrap();
        enroll(&store, "DEV-1", "topic.a", "magic");
        enroll(&store, "DEV-2", "topic.a", "magic");
        let factory = MockFactory {
            cut_topics: HashSet::from(["topic.a".to_string()]),
            ..Default::default()
        };

        let service = PushService::new(store, factory);
        let report = service.push(&ids(&["DEV-1", "DEV-2"])).await.unwrap();

        assert_eq!(report.results["DEV-1"], PushResponse::success("gen1/DEV-1"));
        assert_eq!(
            report.results["DEV-2"],
            PushResponse::failure("connection reset")
        );
        assert!(report.topic_errors["topic.a"].contains("connection reset"));
        assert!(report.is_partial());
    }

    #[tokio::test]
    async fn test_every_topic_failing_is_an_error() {
        let (_dir, store) = store();
        enroll(&store, "DEV-1", "topic.a", "magic");
        enroll(&store, "DEV-2", "topic.b", "magic");

        // No push certificates are stored at all.
        let service = PushService::new(store, MockFactory::default());
        assert!(service.push(&ids(&["DEV-1", "DEV-2"])).await.is_err());
        assert!(service.push(&ids(&["DEV-1"])).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_ids_only() {
        let (_dir, store) = store();
        let service = PushService::new(store, MockFactory::default());
        let report = service.push(&ids(&["NOPE"])).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert!(report.is_partial());
    }
}
