//! Loading splash progress.
//!
//! Progress advances one point per tick, jumps as simulated resources finish
//! loading, and announces a message at each milestone it crosses.

use color_eyre::Result;

use crate::db::KeyValueStore;

/// Interval between ticks
pub const TICK_MS: u64 = 50;

/// Set once the splash has completed at least once
pub const LOADED_KEY: &str = "appLoaded";

const START: u32 = 5;
const DONE: u32 = 100;
const START_MESSAGE: &str = "Inicializando sistema...";
const DONE_MESSAGE: &str = "Pronto! Redirecionando...";

/// (elapsed ms, points) added when a resource group finishes
const BOOSTS: [(u64, u32); 5] = [(300, 10), (800, 15), (1200, 20), (1800, 25), (2500, 25)];

const MILESTONES: [(u32, &str); 6] = [
  (15, "Conectando com fornecedores..."),
  (30, "Localizando motoqueiros próximos..."),
  (45, "Configurando mapa de entregas..."),
  (60, "Carregando catálogo de produtos..."),
  (75, "Preparando interface do usuário..."),
  (90, "Finalizando configurações..."),
];

#[derive(Debug, Clone)]
pub struct SplashProgress {
  step: u32,
  elapsed_ms: u64,
  boosts_applied: usize,
  message: &'static str,
}

impl Default for SplashProgress {
  fn default() -> Self {
    Self::new()
  }
}

impl SplashProgress {
  pub fn new() -> Self {
    Self {
      step: START,
      elapsed_ms: 0,
      boosts_applied: 0,
      message: START_MESSAGE,
    }
  }

  /// Percentage shown on the bar, 0..=100
  pub fn progress(&self) -> u32 {
    self.step.min(DONE)
  }

  pub fn message(&self) -> &'static str {
    self.message
  }

  pub fn is_complete(&self) -> bool {
    self.step >= DONE
  }

  /// Advance one tick. Returns the new message when it changed.
  pub fn tick(&mut self) -> Option<&'static str> {
    if self.is_complete() {
      return None;
    }

    let before = self.progress();
    self.elapsed_ms += TICK_MS;

    while let Some(&(at_ms, points)) = BOOSTS.get(self.boosts_applied) {
      if at_ms > self.elapsed_ms {
        break;
      }
      self.step += points;
      self.boosts_applied += 1;
    }
    self.step += 1;

    let after = self.progress();
    let crossed = MILESTONES
      .iter()
      .filter(|(at, _)| before < *at && *at <= after)
      .last()
      .map(|(_, message)| *message);

    let next = if self.is_complete() {
      Some(DONE_MESSAGE)
    } else {
      crossed
    };

    if let Some(message) = next {
      self.message = message;
    }
    next
  }
}

/// True until a splash has completed on this device
pub fn is_first_load(kv: &impl KeyValueStore) -> bool {
  !matches!(kv.get(LOADED_KEY), Ok(Some(_)))
}

pub fn mark_loaded(kv: &impl KeyValueStore) -> Result<()> {
  kv.set(LOADED_KEY, "true")
}
