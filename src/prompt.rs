//! Persistence for the install prompt dismissal.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;

use crate::db::KeyValueStore;

pub const DISMISSED_KEY: &str = "installPromptDismissed";

/// How long a dismissal suppresses the prompt
pub fn suppression_window() -> Duration {
  Duration::days(7)
}

/// Record a dismissal as epoch milliseconds
pub fn dismiss(kv: &impl KeyValueStore, now: DateTime<Utc>) -> Result<()> {
  kv.set(DISMISSED_KEY, &now.timestamp_millis().to_string())
}

/// Whether the install prompt may be shown at `now`.
///
/// An unreadable timestamp counts as never dismissed. Expired or unreadable
/// dismissals are cleared.
pub fn may_offer(kv: &impl KeyValueStore, now: DateTime<Utc>) -> Result<bool> {
  let Some(raw) = kv.get(DISMISSED_KEY)? else {
    return Ok(true);
  };

  let dismissed_at = raw
    .trim()
    .parse::<i64>()
    .ok()
    .and_then(DateTime::<Utc>::from_timestamp_millis);

  match dismissed_at {
    Some(at) if now - at < suppression_window() => Ok(false),
    _ => {
      kv.remove(DISMISSED_KEY)?;
      Ok(true)
    }
  }
}
