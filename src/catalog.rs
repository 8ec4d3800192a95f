//! Static product catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product offered in the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
  pub id: u32,
  pub name: String,
  pub description: String,
  /// Unit price in reais, two fractional digits
  pub price: Decimal,
  pub category: String,
  pub badge: Option<String>,
}

/// Read-only product table
#[derive(Debug, Clone)]
pub struct Catalog {
  products: Vec<Product>,
}

impl Catalog {
  pub fn new(products: Vec<Product>) -> Self {
    Self { products }
  }

  /// The products shipped with the app
  pub fn builtin() -> Self {
    Self::new(vec![
      product(1, "Carvão Vegetal 3kg", "Carvão de eucalipto premium", 1290, "vegetal", Some("Mais Vendido")),
      product(2, "Carvão Mineral 5kg", "Alto poder calorífico", 2490, "mineral", Some("Novidade")),
      product(3, "Carvão Embalado 10kg", "Pacote família econômico", 3990, "embalado", Some("Economia")),
      product(4, "Acendedor Líquido", "500ml - Acende rápido", 850, "acessorios", None),
      product(5, "Carvão para Churrasco", "Especial para churrasqueira", 1890, "vegetal", None),
      product(6, "Lenha de Eucalipto", "Pacote 15kg", 3290, "vegetal", None),
    ])
  }

  pub fn find(&self, id: u32) -> Option<&Product> {
    self.products.iter().find(|p| p.id == id)
  }

  pub fn products(&self) -> &[Product] {
    &self.products
  }

  /// Case-insensitive match on name or description
  pub fn search(&self, term: &str) -> Vec<&Product> {
    let term = term.trim().to_lowercase();
    self
      .products
      .iter()
      .filter(|p| {
        p.name.to_lowercase().contains(&term) || p.description.to_lowercase().contains(&term)
      })
      .collect()
  }

  pub fn by_category(&self, category: &str) -> Vec<&Product> {
    self
      .products
      .iter()
      .filter(|p| p.category.eq_ignore_ascii_case(category))
      .collect()
  }
}

fn product(
  id: u32,
  name: &str,
  description: &str,
  cents: i64,
  category: &str,
  badge: Option<&str>,
) -> Product {
  Product {
    id,
    name: name.to_string(),
    description: description.to_string(),
    price: Decimal::new(cents, 2),
    category: category.to_string(),
    badge: badge.map(String::from),
  }
}

/// Format an amount as Brazilian reais, e.g. "R$ 12.90"
pub fn format_brl(amount: Decimal) -> String {
  format!("R$ {:.2}", amount)
}
