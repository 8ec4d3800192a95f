//! Replay of queued writes and periodic data refresh.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::http::{Fetcher, Request};
use super::layer::OfflineGateway;
use super::queue::{PendingRequest, RequestKind};
use super::storage::CacheStorage;
use crate::event::{Event, EventHandler};
use crate::notify::{Notification, Notifier};

pub const SYNC_ORDERS_TAG: &str = "sync-orders";
pub const SYNC_LOCATION_TAG: &str = "sync-location";
pub const UPDATE_DATA_TAG: &str = "update-data";

/// Header carrying the entry's stable key on every replay
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const ONLINE_TOAST: &str = "Conexão restaurada!";

/// What one drain did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  /// Ids delivered and removed from the queue
  pub delivered: Vec<i64>,
  /// Entries left queued after a failed attempt
  pub failed: usize,
  /// Another drain was running, nothing was attempted
  pub skipped: bool,
}

/// Drains the pending queue through the network.
///
/// At most one drain runs at a time; a trigger arriving mid-drain is skipped.
/// Delivery is at-least-once: an entry is deleted only after a 2xx reply.
pub struct SyncWorker<S: CacheStorage, F: Fetcher, N: Notifier> {
  gateway: OfflineGateway<S, F>,
  notifier: Arc<N>,
  draining: AtomicBool,
  notify_on_success: bool,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

impl<S: CacheStorage, F: Fetcher, N: Notifier> SyncWorker<S, F, N> {
  pub fn new(gateway: OfflineGateway<S, F>, notifier: Arc<N>) -> Self {
    Self {
      gateway,
      notifier,
      draining: AtomicBool::new(false),
      notify_on_success: true,
    }
  }

  pub fn with_notify_on_success(mut self, notify: bool) -> Self {
    self.notify_on_success = notify;
    self
  }

  fn try_begin(&self) -> Option<DrainGuard<'_>> {
    if self.draining.swap(true, Ordering::SeqCst) {
      None
    } else {
      Some(DrainGuard(&self.draining))
    }
  }

  /// Replay every pending entry of the given kinds, FIFO per kind.
  pub async fn sync(&self, kinds: &[RequestKind]) -> Result<DrainReport> {
    let Some(_guard) = self.try_begin() else {
      debug!("Drain already running, skipping trigger");
      return Ok(DrainReport {
        skipped: true,
        ..DrainReport::default()
      });
    };

    let mut report = DrainReport::default();
    for &kind in kinds {
      let entries = match self.gateway.queue().pending(kind) {
        Ok(entries) => entries,
        Err(e) => {
          warn!(%kind, "Skipping unreadable queue partition: {}", e);
          continue;
        }
      };
      for entry in entries {
        self.replay(&entry, &mut report).await;
      }
    }

    if !report.delivered.is_empty() || report.failed > 0 {
      info!(
        delivered = report.delivered.len(),
        failed = report.failed,
        "Replay finished"
      );
    }
    Ok(report)
  }

  /// Dispatch a named sync request.
  ///
  /// Returns the drain report for queue tags, `None` for data refresh or
  /// unknown tags.
  pub async fn handle_tag(&self, tag: &str) -> Result<Option<DrainReport>> {
    match tag {
      SYNC_ORDERS_TAG => self.sync(&[RequestKind::Order]).await.map(Some),
      SYNC_LOCATION_TAG => self.sync(&[RequestKind::Location]).await.map(Some),
      UPDATE_DATA_TAG => {
        if let Err(e) = self.gateway.refresh_suppliers().await {
          warn!("Failed to update app data: {}", e);
        }
        Ok(None)
      }
      other => {
        warn!(tag = other, "Unknown sync tag");
        Ok(None)
      }
    }
  }

  /// Process events until shutdown or until every sender is gone.
  pub async fn run(&self, events: &mut EventHandler) -> Result<()> {
    info!("Sync worker started");

    while let Some(event) = events.next().await {
      match event {
        Event::Shutdown => break,
        Event::Online => {
          self.notifier.toast(ONLINE_TOAST);
          self.log_failure(self.sync(&RequestKind::ALL).await);
        }
        Event::Tick => {
          self.log_failure(self.sync(&RequestKind::ALL).await);
          self.log_failure(self.handle_tag(UPDATE_DATA_TAG).await);
        }
        Event::Sync(tag) => self.log_failure(self.handle_tag(&tag).await),
      }
    }

    info!("Sync worker stopped");
    Ok(())
  }

  fn log_failure<T>(&self, result: Result<T>) {
    if let Err(e) = result {
      warn!("Sync trigger failed: {}", e);
    }
  }

  async fn replay(&self, entry: &PendingRequest, report: &mut DrainReport) {
    let request = Request::post_json(self.endpoint(entry.kind), entry.payload.clone())
      .with_header(IDEMPOTENCY_HEADER, entry.idempotency_key.as_str());

    match self.gateway.fetcher().fetch(&request).await {
      Ok(response) if response.is_ok() => match self.gateway.queue().delete(entry.id) {
        Ok(_) => {
          report.delivered.push(entry.id);
          if self.notify_on_success {
            self.notifier.show(&confirmation(entry));
          }
        }
        Err(e) => {
          warn!(id = entry.id, "Delivered but failed to dequeue: {}", e);
          report.failed += 1;
        }
      },
      Ok(response) => {
        warn!(
          id = entry.id,
          kind = %entry.kind,
          status = response.status,
          "Replay rejected, keeping entry"
        );
        report.failed += 1;
      }
      Err(e) => {
        warn!(id = entry.id, kind = %entry.kind, "Replay failed: {}", e);
        report.failed += 1;
      }
    }
  }

  fn endpoint(&self, kind: RequestKind) -> &str {
    let config = self.gateway.config();
    match kind {
      RequestKind::Order => config.orders_endpoint.as_str(),
      RequestKind::Location => config.locations_endpoint.as_str(),
    }
  }
}

fn confirmation(entry: &PendingRequest) -> Notification {
  match entry.kind {
    RequestKind::Order => Notification::simple(
      "Pedido sincronizado!",
      format!("Pedido {} enviado com sucesso.", entry.id),
    ),
    RequestKind::Location => Notification::simple(
      "Localização sincronizada!",
      format!("Localização {} enviada com sucesso.", entry.id),
    ),
  }
}
