//! String-keyed durable storage.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use super::Database;

/// Durable get/set storage keyed by string.
///
/// Read-modify-write without locking: a single UI context owns each key.
pub trait KeyValueStore {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;
}

/// Key-value store on the `kv_store` table.
#[derive(Clone)]
pub struct SqliteKv {
  db: Database,
}

impl SqliteKv {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl KeyValueStore for SqliteKv {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.db.conn()?;
    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove key {}: {}", key, e))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_overwrite_remove() {
    let kv = SqliteKv::new(Database::open_in_memory().unwrap());
    assert_eq!(kv.get("k").unwrap(), None);

    kv.set("k", "one").unwrap();
    kv.set("k", "two").unwrap();
    assert_eq!(kv.get("k").unwrap().as_deref(), Some("two"));

    kv.remove("k").unwrap();
    assert_eq!(kv.get("k").unwrap(), None);
  }
}
