//! Push message rendering and notification clicks.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::notify::{Notification, NotificationAction, APP_ICON};

const DEFAULT_TITLE: &str = "Carvão Express";
const DEFAULT_BODY: &str = "Nova entrega disponível!";
/// Page opened by the "view" action
pub const MAIN_PAGE: &str = "/index.html";

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  data: Option<Value>,
}

/// Build the notification for a push message.
///
/// Missing fields get defaults; an unreadable payload is treated as empty.
pub fn notification_for_push(payload: Option<&[u8]>) -> Notification {
  let payload = match payload {
    Some(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes).unwrap_or_else(|e| {
      warn!("Ignoring malformed push payload: {}", e);
      PushPayload::default()
    }),
    _ => PushPayload::default(),
  };

  Notification {
    title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
    body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
    icon: APP_ICON.to_string(),
    badge: Some(APP_ICON.to_string()),
    vibrate: vec![100, 50, 100],
    data: payload
      .data
      .unwrap_or_else(|| Value::Object(Default::default())),
    actions: vec![
      NotificationAction {
        action: "view".to_string(),
        title: "Visualizar".to_string(),
      },
      NotificationAction {
        action: "close".to_string(),
        title: "Fechar".to_string(),
      },
    ],
  }
}

/// Page to open when a notification is clicked, if any.
///
/// The notification is always closed; only "view" opens a window.
pub fn on_notification_click(action: Option<&str>) -> Option<&'static str> {
  match action {
    Some("view") => Some(MAIN_PAGE),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_for_empty_payload() {
    let notification = notification_for_push(None);
    assert_eq!(notification.title, "Carvão Express");
    assert_eq!(notification.body, "Nova entrega disponível!");
    assert_eq!(notification.actions.len(), 2);
    assert_eq!(notification.actions[0].action, "view");
  }

  #[test]
  fn test_payload_fields_are_used() {
    let notification = notification_for_push(Some(
      br#"{"title":"Entregador a caminho","body":"Chega em 10 min","data":{"order":7}}"#,
    ));
    assert_eq!(notification.title, "Entregador a caminho");
    assert_eq!(notification.body, "Chega em 10 min");
    assert_eq!(notification.data["order"], 7);
  }

  #[test]
  fn test_malformed_payload_uses_defaults() {
    let notification = notification_for_push(Some(b"not json"));
    assert_eq!(notification.title, "Carvão Express");
  }

  #[test]
  fn test_click_actions() {
    assert_eq!(on_notification_click(Some("view")), Some("/index.html"));
    assert_eq!(on_notification_click(Some("close")), None);
    assert_eq!(on_notification_click(None), None);
  }
}
