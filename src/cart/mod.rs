//! Shopping cart state mirrored to durable key-value storage.
//!
//! The cart is an ordered list of lines with at most one line per product.
//! Every mutation rewrites the whole cart under [`CART_KEY`].

mod store;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::Product;

pub use store::CartStore;

/// Storage key holding the serialized cart
pub const CART_KEY: &str = "carvaoCarrinho";

/// One product's entry in the cart.
///
/// Product fields are copied when the line is created and not refreshed
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
  #[serde(rename = "id")]
  pub product_id: u32,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub price: Decimal,
  #[serde(default)]
  pub category: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub badge: Option<String>,
  pub quantity: u32,
}

impl CartLine {
  pub(crate) fn from_product(product: &Product) -> Self {
    Self {
      product_id: product.id,
      name: product.name.clone(),
      description: product.description.clone(),
      price: product.price,
      category: product.category.clone(),
      badge: product.badge.clone(),
      quantity: 1,
    }
  }

  pub fn subtotal(&self) -> Decimal {
    self.price * Decimal::from(self.quantity)
  }
}

/// Point-in-time view of the cart for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
  pub lines: Vec<CartLine>,
  /// Sum of quantities
  pub item_count: u64,
  /// Sum of price x quantity
  pub total: Decimal,
}

impl CartSnapshot {
  pub fn from_lines(lines: Vec<CartLine>) -> Self {
    let item_count = lines.iter().map(|l| u64::from(l.quantity)).sum();
    let total = lines.iter().map(CartLine::subtotal).sum();
    Self {
      lines,
      item_count,
      total,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }
}
