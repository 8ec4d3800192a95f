//! Cart actions as the UI invokes them: feedback first, then the mutation,
//! then a toast describing the result.

use color_eyre::Result;

use crate::cart::{CartSnapshot, CartStore};
use crate::catalog::format_brl;
use crate::db::KeyValueStore;
use crate::notify::{Haptics, Notifier};

/// Length of the tap feedback pulse
const TAP_VIBRATION_MS: u32 = 50;

pub struct Storefront<K: KeyValueStore, N: Notifier, H: Haptics> {
  cart: CartStore<K>,
  notifier: N,
  haptics: H,
}

impl<K: KeyValueStore, N: Notifier, H: Haptics> Storefront<K, N, H> {
  pub fn new(cart: CartStore<K>, notifier: N, haptics: H) -> Self {
    Self {
      cart,
      notifier,
      haptics,
    }
  }

  pub fn add_to_cart(&mut self, product_id: u32) -> Result<CartSnapshot> {
    self.haptics.vibrate(TAP_VIBRATION_MS);

    if self.cart.add(product_id)? {
      if let Some(product) = self.cart.catalog().find(product_id) {
        self
          .notifier
          .toast(&format!("{} adicionado ao carrinho!", product.name));
      }
    }

    Ok(self.cart.snapshot())
  }

  pub fn remove_from_cart(&mut self, product_id: u32) -> Result<CartSnapshot> {
    self.cart.remove(product_id)?;
    Ok(self.cart.snapshot())
  }

  pub fn update_quantity(&mut self, product_id: u32, delta: i64) -> Result<CartSnapshot> {
    self.cart.set_quantity_delta(product_id, delta)?;
    Ok(self.cart.snapshot())
  }

  pub fn clear(&mut self) -> Result<CartSnapshot> {
    self.cart.clear()?;
    Ok(self.cart.snapshot())
  }

  /// Confirm the order locally. There is no payment; the cart is emptied.
  pub fn checkout(&mut self) -> Result<Option<CartSnapshot>> {
    match self.cart.checkout()? {
      Some(receipt) => {
        self.notifier.toast(&format!(
          "Pedido confirmado! Total: {}",
          format_brl(receipt.total)
        ));
        Ok(Some(receipt))
      }
      None => {
        self
          .notifier
          .toast("Adicione produtos ao carrinho primeiro!");
        Ok(None)
      }
    }
  }

  pub fn snapshot(&self) -> CartSnapshot {
    self.cart.snapshot()
  }

  #[cfg(test)]
  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  #[cfg(test)]
  pub fn haptics(&self) -> &H {
    &self.haptics
  }
}
