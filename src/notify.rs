//! User-visible feedback: toasts, system notifications and haptics.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

pub const APP_ICON: &str = "/assets/images/icon-192.png";

/// Action button shown on a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A system notification ready to display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: Option<String>,
  /// Vibration pattern in milliseconds
  pub vibrate: Vec<u32>,
  pub data: Value,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  /// Plain notification with only title and body
  pub fn simple(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      body: body.into(),
      icon: APP_ICON.to_string(),
      badge: None,
      vibrate: Vec::new(),
      data: Value::Object(Default::default()),
      actions: Vec::new(),
    }
  }
}

/// Surface for messages shown to the user
pub trait Notifier: Send + Sync {
  /// Short in-app message
  fn toast(&self, message: &str);

  /// System notification
  fn show(&self, notification: &Notification);
}

/// Device vibration
pub trait Haptics {
  fn vibrate(&self, millis: u32);
}

/// Prints to stdout and records to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn toast(&self, message: &str) {
    info!(message, "toast");
    println!("» {}", message);
  }

  fn show(&self, notification: &Notification) {
    info!(title = %notification.title, body = %notification.body, "notification");
    println!("🔔 {}: {}", notification.title, notification.body);
    for action in &notification.actions {
      println!("   [{}] {}", action.action, action.title);
    }
  }
}

/// Terminals cannot vibrate; the request is only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHaptics;

impl Haptics for LogHaptics {
  fn vibrate(&self, millis: u32) {
    debug!(millis, "vibrate");
  }
}
