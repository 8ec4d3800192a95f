//! Durable queue of mutating requests that failed while offline.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::warn;

use crate::db::Database;

/// Which endpoint a pending request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
  Order,
  Location,
}

impl RequestKind {
  pub const ALL: [RequestKind; 2] = [RequestKind::Order, RequestKind::Location];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Order => "order",
      Self::Location => "location",
    }
  }
}

impl fmt::Display for RequestKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A queued request awaiting delivery. Delivered entries are deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
  pub id: i64,
  pub kind: RequestKind,
  /// Serialized request body, replayed verbatim
  pub payload: Vec<u8>,
  /// Stable across replays so the server can drop duplicates
  pub idempotency_key: String,
  pub created_at: DateTime<Utc>,
}

/// FIFO queue per [`RequestKind`] on the `pending_requests` table.
#[derive(Clone)]
pub struct PendingQueue {
  db: Database,
}

impl PendingQueue {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  pub fn enqueue(&self, kind: RequestKind, payload: &[u8]) -> Result<PendingRequest> {
    let created_at = Utc::now();
    let idempotency_key = idempotency_key(kind, created_at, payload);

    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT INTO pending_requests (kind, payload, idempotency_key, created_at)
         VALUES (?, ?, ?, ?)",
        params![
          kind.as_str(),
          payload,
          idempotency_key,
          created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
        ],
      )
      .map_err(|e| eyre!("Failed to queue {} request: {}", kind, e))?;

    Ok(PendingRequest {
      id: conn.last_insert_rowid(),
      kind,
      payload: payload.to_vec(),
      idempotency_key,
      created_at,
    })
  }

  /// Pending entries of one kind, oldest first
  pub fn pending(&self, kind: RequestKind) -> Result<Vec<PendingRequest>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, payload, idempotency_key, created_at FROM pending_requests
         WHERE kind = ?
         ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![kind.as_str()], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, Vec<u8>>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query pending {} requests: {}", kind, e))?;

    let mut entries = Vec::new();
    for row in rows {
      let (id, payload, idempotency_key, created_at) =
        row.map_err(|e| eyre!("Failed to read pending request: {}", e))?;
      let created_at = match DateTime::parse_from_rfc3339(&created_at) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
          warn!(id, "Pending request has unreadable timestamp: {}", e);
          DateTime::<Utc>::default()
        }
      };
      entries.push(PendingRequest {
        id,
        kind,
        payload,
        idempotency_key,
        created_at,
      });
    }

    Ok(entries)
  }

  /// Number of pending entries of one kind
  pub fn len(&self, kind: RequestKind) -> Result<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM pending_requests WHERE kind = ?",
        params![kind.as_str()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count pending {} requests: {}", kind, e))?;
    Ok(usize::try_from(count).unwrap_or_default())
  }

  /// Remove a delivered entry. Returns whether it existed.
  pub fn delete(&self, id: i64) -> Result<bool> {
    let conn = self.db.conn()?;
    let removed = conn
      .execute("DELETE FROM pending_requests WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete pending request {}: {}", id, e))?;
    Ok(removed > 0)
  }
}

/// SHA-256 over kind, enqueue time and body, hex encoded
fn idempotency_key(kind: RequestKind, created_at: DateTime<Utc>, payload: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(kind.as_str().as_bytes());
  hasher.update(b":");
  hasher.update(
    created_at
      .timestamp_nanos_opt()
      .unwrap_or_default()
      .to_be_bytes(),
  );
  hasher.update(b":");
  hasher.update(payload);
  hex::encode(hasher.finalize())
}
