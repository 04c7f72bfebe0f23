//! MDM Server - Apple MDM check-in, command and push endpoints.

mod config;

use std::sync::Arc;

use color_eyre::eyre::WrapErr as _;
use mdm_crypto::{CertVerifier, PoolVerifier};
use mdm_push::{ApnsProviderFactory, PushService};
use mdm_service::{CertAuthService, MdmService, StaticSecrets, StaticTokens, UaService};
use mdm_storage::{AllStorage, FileStorage, MultiStorage, SqliteStorage};
use tower_http::trace::TraceLayer;

use crate::config::{Backend, Config, StorageConfig};

/// Opened storage plus a handle on the primary SQLite backend, if any, for
/// flushing last-seen updates at shutdown.
struct Storage {
    all: MultiStorage,
    sqlite: Option<SqliteStorage>,
}

fn open_sqlite(path: &str) -> color_eyre::eyre::Result<SqliteStorage> {
    let storage = SqliteStorage::new(path)
        .wrap_err_with(|| format!("failed to open SQLite database {path}"))?;
    storage
        .run_migrations()
        .wrap_err("failed to run migrations")?;
    Ok(storage)
}

fn open_backend(backend: Backend, path: &str) -> color_eyre::eyre::Result<Arc<dyn AllStorage>> {
    let storage: Arc<dyn AllStorage> = match backend {
        Backend::Sqlite => Arc::new(open_sqlite(path)?),
        Backend::File => Arc::new(
            FileStorage::new(path)
                .wrap_err_with(|| format!("failed to open file storage at {path}"))?,
        ),
    };
    Ok(storage)
}

/// Open the primary backend and its mirrors.
///
/// Last-seen batching spawns a task, so this must run inside the runtime.
fn open_storage(config: &StorageConfig) -> color_eyre::eyre::Result<Storage> {
    let (primary, sqlite) = match config.backend {
        Backend::Sqlite => {
            let mut storage = open_sqlite(&config.path)?;
            if let Some(replica) = &config.replica {
                storage = storage
                    .with_replica(replica)
                    .wrap_err("failed to open read replica")?;
            }
            if let Some(last_seen) = &config.last_seen {
                storage = storage.with_async_last_seen(last_seen.interval(), last_seen.capacity);
            }
            let primary: Arc<dyn AllStorage> = Arc::new(storage.clone());
            (primary, Some(storage))
        }
        Backend::File => {
            if config.replica.is_some() || config.last_seen.is_some() {
                tracing::warn!("replica and last_seen settings only apply to the sqlite backend");
            }
            (open_backend(Backend::File, &config.path)?, None)
        }
    };

    let mirrors = config
        .mirrors
        .iter()
        .map(|m| open_backend(m.backend, &m.path))
        .collect::<color_eyre::eyre::Result<Vec<_>>>()
        .wrap_err("failed to open storage mirror")?;

    tracing::info!(
        backend = ?config.backend,
        path = %config.path,
        mirrors = mirrors.len(),
        "storage opened"
    );

    Ok(Storage {
        all: MultiStorage::new(primary, mirrors),
        sqlite,
    })
}

fn load_verifier(config: &Config) -> color_eyre::eyre::Result<Option<Arc<dyn CertVerifier>>> {
    let Some(path) = &config.ca_pem else {
        return Ok(None);
    };
    let bundle = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read CA bundle {}", path.display()))?;
    Ok(Some(Arc::new(PoolVerifier::from_pem(&bundle)?)))
}

/// Build the full application router.
fn build_app(config: &Config, storage: &MultiStorage) -> color_eyre::eyre::Result<axum::Router> {
    let verifier = load_verifier(config)?;

    let ua = UaService::new(
        storage.clone(),
        config.user_authenticate.empty_digest_challenge,
        config.user_authenticate.store_rejected,
    );
    let mut service = MdmService::new(storage.clone())
        .with_user_authenticate(ua)
        .with_get_token(StaticTokens::new(config.get_tokens()));
    if !config.secrets.is_empty() {
        service = service.with_secrets(Arc::new(StaticSecrets::new(config.secrets.clone())));
    }

    let mdm = if config.certauth.enabled {
        let service = CertAuthService::new(storage.clone(), service, config.certauth.options);
        mdm_http::mdm_router(Arc::new(service), verifier)
    } else {
        tracing::warn!("certificate authentication disabled");
        mdm_http::mdm_router(Arc::new(service), verifier)
    };

    let pusher = PushService::new(storage.clone(), ApnsProviderFactory::new(config.push.sandbox));
    let api = mdm_http::api_router(Arc::new(storage.clone()), Arc::new(pusher));

    Ok(mdm.merge(api).layer(TraceLayer::new_for_http()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    let config = Config::load().wrap_err("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("mdm-server starting");

    let storage = open_storage(&config.storage)?;
    let app = build_app(&config, &storage.all)?;

    tracing::info!(addr = %config.listen, "listening");
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .wrap_err("failed to bind")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    if let Some(sqlite) = storage.sqlite {
        sqlite.flush_last_seen();
    }

    Ok(())
}
