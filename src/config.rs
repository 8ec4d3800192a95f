use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin that relative request URLs resolve against
  pub origin: String,
  /// Where the database and logs live (defaults to $XDG_DATA_HOME/carvao)
  pub data_dir: Option<PathBuf>,
  pub gateway: GatewayConfig,
  pub sync: SyncConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      data_dir: None,
      gateway: GatewayConfig::default(),
      sync: SyncConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
  /// Cache namespace; bump to purge everything cached by older versions
  pub cache_version: String,
  /// URLs containing this prefix are served network-first
  pub api_prefix: String,
  /// Page served for offline navigations
  pub offline_url: String,
  /// Assets fetched on install
  pub precache: Vec<String>,
  /// Disable to bypass the response cache entirely
  pub cache_enabled: bool,
  pub orders_endpoint: String,
  pub locations_endpoint: String,
  pub suppliers_update_url: String,
  pub suppliers_url: String,
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      cache_version: "carvao-delivery-v1".to_string(),
      api_prefix: "/api/".to_string(),
      offline_url: "/loading.html".to_string(),
      precache: default_precache(),
      cache_enabled: true,
      orders_endpoint: "/api/orders".to_string(),
      locations_endpoint: "/api/locations".to_string(),
      suppliers_update_url: "/api/suppliers/update".to_string(),
      suppliers_url: "/api/suppliers".to_string(),
    }
  }
}

fn default_precache() -> Vec<String> {
  [
    "/",
    "/loading.html",
    "/index.html",
    "/assets/css/style.css",
    "/assets/css/loading.css",
    "/assets/js/app.js",
    "/assets/js/loading.js",
    "/assets/js/map.js",
    "/manifest.json",
    "/assets/images/icon-192.png",
    "/assets/images/icon-512.png",
    "/assets/images/loading-logo.png",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
    "https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;500;600;700;800&display=swap",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Seconds between periodic sync ticks
  pub interval_secs: u64,
  /// Show a notification for each replayed request
  pub notify_on_success: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: 3600,
      notify_on_success: true,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./carvao.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/carvao/config.yaml
  ///
  /// Without a file the built-in defaults are used. `CARVAO_ORIGIN`
  /// overrides the origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var("CARVAO_ORIGIN") {
      config.origin = origin;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("carvao.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("carvao").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Directory for the database and log files
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("carvao"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.gateway.cache_version, "carvao-delivery-v1");
    assert_eq!(config.gateway.precache.len(), 16);
    assert_eq!(config.sync.interval_secs, 3600);
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::parse(
      r#"
origin: https://carvao.example
gateway:
  cache_version: carvao-delivery-v2
  precache: ["/", "/index.html"]
sync:
  notify_on_success: false
"#,
    )
    .unwrap();

    assert_eq!(config.origin, "https://carvao.example");
    assert_eq!(config.gateway.cache_version, "carvao-delivery-v2");
    assert_eq!(config.gateway.precache.len(), 2);
    assert_eq!(config.gateway.api_prefix, "/api/");
    assert!(!config.sync.notify_on_success);
    assert_eq!(config.sync.interval_secs, 3600);
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/carvao.yaml"))).is_err());
  }

  #[test]
  fn test_explicit_data_dir_wins() {
    let config = Config {
      data_dir: Some(PathBuf::from("/tmp/carvao-test")),
      ..Config::default()
    };
    assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/carvao-test"));
  }
}
