use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Background sync events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Periodic timer
  Tick,
  /// Connectivity came back
  Online,
  /// Named sync request ("sync-orders", "sync-location", "update-data")
  Sync(String),
  /// Stop the worker loop
  Shutdown,
}

/// Event source combining a periodic timer with externally sent signals
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create an event handler that ticks every `tick_rate`; the first tick
  /// fires one period after creation
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn timer
    let timer_tx = tx.clone();
    tokio::spawn(async move {
      let mut timer = interval_at(Instant::now() + tick_rate, tick_rate);
      timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        timer.tick().await;
        if timer_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for signals from other tasks
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
