//! Offline cache gateway.
//!
//! This module sits between the app and the network and provides:
//! - Network-first answers for API paths with a cached fallback
//! - Cache-first answers for static assets with an offline page for navigation
//! - Versioned cache install/activation
//! - A durable replay queue for order and location writes that fail offline
//! - Push notification rendering

mod http;
mod layer;
mod outcome;
mod push;
mod queue;
mod storage;
mod sync;

pub use http::{HttpFetcher, Request};
pub use layer::OfflineGateway;
pub use outcome::{CacheSource, FetchOutcome};
pub use push::{notification_for_push, on_notification_click};
pub use queue::{PendingQueue, RequestKind};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use sync::{DrainReport, SyncWorker};
