//! Response cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::http::{Response, ResponseKind};
use crate::db::Database;

/// A cached response with its timestamp.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Entries live in named namespaces; a namespace disappears with all its
/// entries when deleted.
pub trait CacheStorage: Send + Sync {
  /// Names of every existing namespace.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Look up a URL in one namespace.
  fn match_url(&self, cache_name: &str, url: &str) -> Result<Option<CachedResponse>>;

  /// Store or replace a single response, creating the namespace if needed.
  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()>;

  /// Store a batch atomically: either every entry is written or none is.
  fn put_all(&self, cache_name: &str, entries: &[(String, Response)]) -> Result<()>;

  /// Delete a namespace. Returns whether it existed.
  fn delete_cache(&self, cache_name: &str) -> Result<bool>;
}

impl<S: CacheStorage + ?Sized> CacheStorage for Box<S> {
  fn cache_names(&self) -> Result<Vec<String>> {
    (**self).cache_names()
  }

  fn match_url(&self, cache_name: &str, url: &str) -> Result<Option<CachedResponse>> {
    (**self).match_url(cache_name, url)
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    (**self).put(cache_name, url, response)
  }

  fn put_all(&self, cache_name: &str, entries: &[(String, Response)]) -> Result<()> {
    (**self).put_all(cache_name, entries)
  }

  fn delete_cache(&self, cache_name: &str) -> Result<bool> {
    (**self).delete_cache(cache_name)
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn cache_names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn match_url(&self, _cache_name: &str, _url: &str) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn put(&self, _cache_name: &str, _url: &str, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn put_all(&self, _cache_name: &str, _entries: &[(String, Response)]) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete_cache(&self, _cache_name: &str) -> Result<bool> {
    Ok(false)
  }
}

/// SQLite-based cache storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
  db: Database,
}

impl SqliteStorage {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

fn ensure_namespace(conn: &Connection, cache_name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_names (name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;
  Ok(())
}

fn insert_entry(conn: &Connection, cache_name: &str, url: &str, response: &Response) -> Result<()> {
  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (cache_name, url, status, content_type, kind, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        url,
        response.status,
        response.content_type,
        response.kind.as_str(),
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to cache {}: {}", url, e))?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_names ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn match_url(&self, cache_name: &str, url: &str) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, Option<String>, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, content_type, kind, body, cached_at FROM cache_entries
         WHERE cache_name = ? AND url = ?",
        params![cache_name, url],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", url, e))?;

    match row {
      Some((status, content_type, kind, body, cached_at_str)) => Ok(Some(CachedResponse {
        response: Response {
          status,
          content_type,
          kind: ResponseKind::parse(&kind),
          body,
        },
        cached_at: parse_datetime(&cached_at_str)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, cache_name: &str, url: &str, response: &Response) -> Result<()> {
    let conn = self.db.conn()?;
    ensure_namespace(&conn, cache_name)?;
    insert_entry(&conn, cache_name, url, response)
  }

  fn put_all(&self, cache_name: &str, entries: &[(String, Response)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_namespace(&tx, cache_name)?;
    for (url, response) in entries {
      insert_entry(&tx, cache_name, url, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn delete_cache(&self, cache_name: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", cache_name, e))?;
    let removed = tx
      .execute("DELETE FROM cache_names WHERE name = ?", params![cache_name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(removed > 0)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn storage() -> SqliteStorage {
    SqliteStorage::new(Database::open_in_memory().unwrap())
  }

  #[test]
  fn test_put_and_match() {
    let storage = storage();
    let response = Response::new(200, Some("text/css"), "body{}");

    storage.put("v1", "/style.css", &response).unwrap();

    let cached = storage.match_url("v1", "/style.css").unwrap().unwrap();
    assert_eq!(cached.response, response);
    assert!(storage.match_url("v2", "/style.css").unwrap().is_none());
    assert_eq!(storage.cache_names().unwrap(), vec!["v1".to_string()]);
  }

  #[test]
  fn test_put_replaces_entry() {
    let storage = storage();
    storage
      .put("v1", "/api/x", &Response::json("1"))
      .unwrap();
    storage
      .put("v1", "/api/x", &Response::json("2"))
      .unwrap();

    let cached = storage.match_url("v1", "/api/x").unwrap().unwrap();
    assert_eq!(cached.response.body, b"2");
  }

  #[test]
  fn test_delete_cache_removes_entries() {
    let storage = storage();
    storage
      .put_all(
        "old",
        &[
          ("/a".to_string(), Response::json("a")),
          ("/b".to_string(), Response::json("b")),
        ],
      )
      .unwrap();

    assert!(storage.delete_cache("old").unwrap());
    assert!(!storage.delete_cache("old").unwrap());
    assert!(storage.match_url("old", "/a").unwrap().is_none());
    assert!(storage.cache_names().unwrap().is_empty());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.put("v1", "/a", &Response::json("a")).unwrap();
    assert!(storage.match_url("v1", "/a").unwrap().is_none());
  }
}
