use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use super::{CartLine, CartSnapshot, CART_KEY};
use crate::catalog::Catalog;
use crate::db::KeyValueStore;

/// Owns the cart lines and mirrors them to a [`KeyValueStore`].
pub struct CartStore<K: KeyValueStore> {
  lines: Vec<CartLine>,
  catalog: Catalog,
  storage: K,
}

impl<K: KeyValueStore> CartStore<K> {
  /// Restore the cart from storage.
  ///
  /// Missing, unreadable or corrupt data yields an empty cart.
  pub fn load(storage: K, catalog: Catalog) -> Self {
    let lines = match storage.get(CART_KEY) {
      Ok(Some(raw)) => match serde_json::from_str::<Vec<CartLine>>(&raw) {
        Ok(lines) => normalize(lines),
        Err(e) => {
          warn!("Discarding corrupt cart data: {}", e);
          Vec::new()
        }
      },
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!("Failed to read cart, starting empty: {}", e);
        Vec::new()
      }
    };

    Self {
      lines,
      catalog,
      storage,
    }
  }

  /// Add one unit of a product.
  ///
  /// Returns `false` without touching storage when the product is unknown.
  pub fn add(&mut self, product_id: u32) -> Result<bool> {
    let Some(product) = self.catalog.find(product_id) else {
      debug!(product_id, "Ignoring add for unknown product");
      return Ok(false);
    };

    match self.position(product_id) {
      Some(idx) => {
        let line = &mut self.lines[idx];
        line.quantity = line.quantity.saturating_add(1);
      }
      None => self.lines.push(CartLine::from_product(product)),
    }

    self.persist()?;
    Ok(true)
  }

  /// Remove a product's line. Removing an absent product is a no-op.
  pub fn remove(&mut self, product_id: u32) -> Result<()> {
    self.lines.retain(|line| line.product_id != product_id);
    self.persist()
  }

  /// Adjust a line's quantity by `delta`; the line is removed at zero or below.
  pub fn set_quantity_delta(&mut self, product_id: u32, delta: i64) -> Result<()> {
    let Some(idx) = self.position(product_id) else {
      return Ok(());
    };

    let quantity = i64::from(self.lines[idx].quantity).saturating_add(delta);
    if quantity <= 0 {
      self.lines.remove(idx);
    } else {
      self.lines[idx].quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
    }

    self.persist()
  }

  pub fn clear(&mut self) -> Result<()> {
    self.lines.clear();
    self.persist()
  }

  /// Empty the cart and return what was ordered.
  ///
  /// Returns `None` and leaves storage untouched when the cart is empty.
  pub fn checkout(&mut self) -> Result<Option<CartSnapshot>> {
    if self.lines.is_empty() {
      return Ok(None);
    }

    let receipt = self.snapshot();
    self.clear()?;
    Ok(Some(receipt))
  }

  pub fn snapshot(&self) -> CartSnapshot {
    CartSnapshot::from_lines(self.lines.clone())
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  fn position(&self, product_id: u32) -> Option<usize> {
    self.lines.iter().position(|l| l.product_id == product_id)
  }

  fn persist(&self) -> Result<()> {
    let json =
      serde_json::to_string(&self.lines).map_err(|e| eyre!("Failed to serialize cart: {}", e))?;
    self.storage.set(CART_KEY, &json)
  }
}

/// Merge duplicate product lines and drop empty ones.
fn normalize(lines: Vec<CartLine>) -> Vec<CartLine> {
  let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
  for line in lines.into_iter().filter(|l| l.quantity > 0) {
    match merged.iter_mut().find(|m| m.product_id == line.product_id) {
      Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
      None => merged.push(line),
    }
  }
  merged
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::{Database, SqliteKv};
  use proptest::prelude::*;
  use rust_decimal::Decimal;

  fn store() -> CartStore<SqliteKv> {
    let kv = SqliteKv::new(Database::open_in_memory().unwrap());
    CartStore::load(kv, Catalog::builtin())
  }

  fn reload(store: &CartStore<SqliteKv>) -> CartStore<SqliteKv> {
    CartStore::load(store.storage.clone(), Catalog::builtin())
  }

  #[test]
  fn test_add_same_product_twice_merges() {
    let mut cart = store();

    cart.add(1).unwrap();
    let snapshot = cart.snapshot();
    assert_eq!(snapshot.lines.len(), 1);
    assert_eq!(snapshot.lines[0].quantity, 1);
    assert_eq!(snapshot.total, Decimal::new(1290, 2));

    cart.add(1).unwrap();
    let snapshot = cart.snapshot();
    assert_eq!(snapshot.lines.len(), 1);
    assert_eq!(snapshot.lines[0].quantity, 2);
    assert_eq!(snapshot.item_count, 2);
    assert_eq!(snapshot.total, Decimal::new(2580, 2));

    cart.set_quantity_delta(1, -2).unwrap();
    assert!(cart.snapshot().is_empty());
  }

  #[test]
  fn test_add_unknown_product_is_noop() {
    let mut cart = store();
    assert!(!cart.add(42).unwrap());
    assert!(cart.snapshot().is_empty());
    assert_eq!(cart.storage.get(CART_KEY).unwrap(), None);
  }

  #[test]
  fn test_decrement_below_zero_removes_line() {
    let mut cart = store();
    cart.add(2).unwrap();
    cart.add(3).unwrap();

    cart.set_quantity_delta(2, -5).unwrap();

    let snapshot = cart.snapshot();
    assert_eq!(snapshot.lines.len(), 1);
    assert_eq!(snapshot.lines[0].product_id, 3);
  }

  #[test]
  fn test_remove_is_idempotent() {
    let mut cart = store();
    cart.add(4).unwrap();
    cart.remove(4).unwrap();
    cart.remove(4).unwrap();
    assert!(cart.snapshot().is_empty());
  }

  #[test]
  fn test_reload_preserves_order_and_quantities() {
    let mut cart = store();
    cart.add(5).unwrap();
    cart.add(1).unwrap();
    cart.add(5).unwrap();
    cart.set_quantity_delta(1, 3).unwrap();

    assert_eq!(reload(&cart).snapshot(), cart.snapshot());
  }

  #[test]
  fn test_corrupt_storage_loads_empty() {
    let kv = SqliteKv::new(Database::open_in_memory().unwrap());
    kv.set(CART_KEY, "{not json").unwrap();

    let cart = CartStore::load(kv, Catalog::builtin());
    assert!(cart.snapshot().is_empty());
  }

  #[test]
  fn test_load_accepts_numeric_prices_and_normalizes() {
    let kv = SqliteKv::new(Database::open_in_memory().unwrap());
    kv.set(
      CART_KEY,
      r#"[
        {"id":1,"name":"Carvão Vegetal 3kg","price":12.9,"quantity":1},
        {"id":1,"name":"Carvão Vegetal 3kg","price":12.9,"quantity":2},
        {"id":4,"name":"Acendedor Líquido","price":8.5,"quantity":0}
      ]"#,
    )
    .unwrap();

    let snapshot = CartStore::load(kv, Catalog::builtin()).snapshot();
    assert_eq!(snapshot.lines.len(), 1);
    assert_eq!(snapshot.lines[0].quantity, 3);
    assert_eq!(snapshot.total, Decimal::new(3870, 2));
  }

  #[test]
  fn test_checkout_returns_receipt_and_clears() {
    let mut cart = store();
    assert!(cart.checkout().unwrap().is_none());

    cart.add(3).unwrap();
    cart.add(6).unwrap();
    let receipt = cart.checkout().unwrap().unwrap();
    assert_eq!(receipt.item_count, 2);
    assert_eq!(receipt.total, Decimal::new(7280, 2));

    assert!(cart.snapshot().is_empty());
    assert!(reload(&cart).snapshot().is_empty());
  }

  proptest! {
    #[test]
    fn test_totals_match_persisted_lines_over_mixed_operations(
      ops in prop::collection::vec((0u8..4, 0u32..8, -3i64..2), 0..64)
    ) {
      let mut cart = store();

      for (op, product_id, delta) in ops {
        match op {
          0 | 1 => {
            cart.add(product_id).unwrap();
          }
          2 => cart.set_quantity_delta(product_id, delta).unwrap(),
          _ => cart.remove(product_id).unwrap(),
        }

        let stored = cart.storage.get(CART_KEY).unwrap().unwrap_or_else(|| "[]".into());
        let persisted: Vec<CartLine> = serde_json::from_str(&stored).unwrap();
        let snapshot = cart.snapshot();

        let count: u64 = persisted.iter().map(|l| u64::from(l.quantity)).sum();
        let total: Decimal = persisted
          .iter()
          .map(|l| l.price * Decimal::from(l.quantity))
          .sum();
        prop_assert_eq!(snapshot.item_count, count);
        prop_assert_eq!(snapshot.total, total);
        prop_assert!(snapshot.lines.iter().all(|l| l.quantity >= 1));
        prop_assert_eq!(&snapshot.lines, &persisted);
      }
    }
  }
}
