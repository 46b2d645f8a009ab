//! Pipeline services: testing-service adapters, caching, locking and notification.

pub mod build_cache;
pub mod crate_refresher;
pub mod event_broadcaster;
pub mod metrics;
pub mod notifier;
pub mod session;
pub mod testing_service;
pub mod transaction;

pub use build_cache::BuildCache;
pub use crate_refresher::{CrateRefresher, RemoteCrateRefresher};
pub use event_broadcaster::EventBroadcaster;
pub use self::metrics::{Metrics, MetricsSnapshot};
pub use notifier::{TransitionKind, TransitionNotifier};
pub use session::{AuthContext, SubmitterSession};
pub use testing_service::{ServiceRegistry, TestingService, TestingServiceConfig};
pub use transaction::{TransactionGuard, TransactionScope};
