//! MDM HTTP Layer
//!
//! Axum handlers for the MDM check-in and command endpoints and the
//! control-plane API.

mod api;
mod error;
mod handlers;
mod middleware;

pub use api::*;
pub use error::*;
pub use handlers::*;
pub use middleware::*;

use std::sync::Arc;

use axum::Router;
use mdm_crypto::CertVerifier;

/// Create the MDM device router.
pub fn mdm_router<S>(service: Arc<S>, verifier: Option<Arc<dyn CertVerifier>>) -> Router
where
    S: mdm_service::CheckinAndCommand + 'static,
{
    use axum::routing::put;

    Router::new()
        .route(
            "/mdm/checkin",
            put(handlers::checkin_handler::<S>).post(handlers::checkin_handler::<S>),
        )
        .route(
            "/mdm/command",
            put(handlers::command_handler::<S>).post(handlers::command_handler::<S>),
        )
        .with_state(MdmState { service, verifier })
        .layer(axum::middleware::from_fn(trace_id_middleware))
}

/// Create the API router.
pub fn api_router<St, P>(store: Arc<St>, pusher: Arc<P>) -> Router
where
    St: mdm_storage::CommandQueueStore + mdm_storage::PushCertStore + 'static,
    P: mdm_push::Pusher + 'static,
{
    use axum::routing::{get, put};

    Router::new()
        .route("/v1/pushcert", put(api::store_push_cert::<St, P>))
        .route(
            "/v1/push/{ids}",
            get(api::push_handler::<St, P>).post(api::push_handler::<St, P>),
        )
        .route("/v1/enqueue/{ids}", put(api::enqueue_handler::<St, P>))
        .with_state(ApiState { store, pusher })
        .layer(axum::middleware::from_fn(trace_id_middleware))
}
