//! MDM Push Notifications
//!
//! APNs push notification delivery for MDM.

mod apns;
mod service;
mod traits;

pub use apns::{ApnsProvider, ApnsProviderFactory};
pub use service::PushService;
pub use traits::*;
