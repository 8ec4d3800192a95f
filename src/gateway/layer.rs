//! Request interception: routing policy, install and activation.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::http::{Fetcher, Request, RequestMode, Response, ResponseKind};
use super::outcome::{CacheResult, FetchOutcome};
use super::queue::{PendingQueue, RequestKind};
use super::storage::CacheStorage;
use crate::config::GatewayConfig;

/// Gateway between the app and the network.
///
/// GET requests are answered network-first on API paths and cache-first
/// elsewhere. Failed POSTs to the order and location endpoints are queued
/// for replay instead of failing.
///
/// Cache entries are keyed by absolute URL without fragment, so a relative
/// path and its absolute form hit the same entry.
pub struct OfflineGateway<S: CacheStorage, F: Fetcher> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  queue: PendingQueue,
  config: Arc<GatewayConfig>,
  origin: Arc<Url>,
}

impl<S: CacheStorage, F: Fetcher> OfflineGateway<S, F> {
  pub fn new(
    storage: S,
    fetcher: Arc<F>,
    queue: PendingQueue,
    config: GatewayConfig,
    origin: Url,
  ) -> Self {
    Self {
      storage: Arc::new(storage),
      fetcher,
      queue,
      config: Arc::new(config),
      origin: Arc::new(origin),
    }
  }

  /// Name of the cache namespace for the current version
  pub fn cache_name(&self) -> &str {
    &self.config.cache_version
  }

  pub fn config(&self) -> &GatewayConfig {
    &self.config
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  pub fn queue(&self) -> &PendingQueue {
    &self.queue
  }

  #[cfg(test)]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Storage key for a request URL: resolved against the origin, fragment
  /// dropped. URLs that do not resolve are kept as given.
  pub fn cache_key(&self, url: &str) -> String {
    match self.origin.join(url) {
      Ok(mut resolved) => {
        resolved.set_fragment(None);
        resolved.to_string()
      }
      Err(_) => url.to_string(),
    }
  }

  /// Pre-populate the current cache with the precache manifest.
  ///
  /// Any asset that fails to download aborts the install and nothing is
  /// written; the caller retries later.
  pub async fn install(&self) -> Result<usize> {
    let fetches = self.config.precache.iter().map(|url| async move {
      let response = self
        .fetcher
        .fetch(&Request::get(url.as_str()))
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", url, e))?;
      if !response.is_ok() {
        return Err(eyre!(
          "Failed to precache {}: HTTP {}",
          url,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((self.cache_key(url), response))
    });

    let entries = futures::future::try_join_all(fetches).await?;
    self.storage.put_all(self.cache_name(), &entries)?;

    info!(
      cache = self.cache_name(),
      count = entries.len(),
      "Precached assets"
    );
    Ok(entries.len())
  }

  /// Delete every cache namespace except the current one.
  ///
  /// Returns the names that were purged.
  pub fn activate(&self) -> Result<Vec<String>> {
    let mut purged = Vec::new();

    for name in self.storage.cache_names()? {
      if name != self.cache_name() {
        self.storage.delete_cache(&name)?;
        info!(cache = %name, "Removed stale cache");
        purged.push(name);
      }
    }

    Ok(purged)
  }

  /// Route a request through the gateway.
  pub async fn handle(&self, request: &Request) -> Result<FetchOutcome> {
    if request.method != Method::GET {
      return self.pass_through(request).await;
    }

    if request.url.contains(self.config.api_prefix.as_str()) {
      self.network_first(request).await
    } else {
      self.cache_first(request).await
    }
  }

  /// Replay queue partition for a write request, if it has one
  pub fn queue_kind(&self, request: &Request) -> Option<RequestKind> {
    if request.method != Method::POST {
      return None;
    }

    let path = request.path();
    if path == Request::get(self.config.orders_endpoint.as_str()).path() {
      Some(RequestKind::Order)
    } else if path == Request::get(self.config.locations_endpoint.as_str()).path() {
      Some(RequestKind::Location)
    } else {
      None
    }
  }

  /// Fetch the latest supplier data and store it under the suppliers URL.
  pub async fn refresh_suppliers(&self) -> Result<()> {
    let url = &self.config.suppliers_update_url;
    let response = self.fetcher.fetch(&Request::get(url.as_str())).await?;
    if !response.is_ok() {
      return Err(eyre!("Supplier update failed: HTTP {}", response.status));
    }

    let data: serde_json::Value = serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse supplier data: {}", e))?;
    let body =
      serde_json::to_vec(&data).map_err(|e| eyre!("Failed to serialize supplier data: {}", e))?;

    let key = self.cache_key(&self.config.suppliers_url);
    self
      .storage
      .put(self.cache_name(), &key, &Response::json(body))?;
    debug!("Supplier data refreshed");
    Ok(())
  }

  async fn pass_through(&self, request: &Request) -> Result<FetchOutcome> {
    match self.fetcher.fetch(request).await {
      Ok(response) => Ok(FetchOutcome::Response(CacheResult::from_network(response))),
      Err(err) => match self.queue_kind(request) {
        Some(kind) => {
          let body = request.body.as_deref().unwrap_or_default();
          let entry = self.queue.enqueue(kind, body)?;
          info!(id = entry.id, %kind, "Queued request for replay: {}", err);
          Ok(FetchOutcome::Queued { id: entry.id, kind })
        }
        None => Err(err),
      },
    }
  }

  async fn network_first(&self, request: &Request) -> Result<FetchOutcome> {
    let key = self.cache_key(&request.url);
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if let Err(e) = self.storage.put(self.cache_name(), &key, &response) {
          warn!(url = %request.url, "Failed to cache response: {}", e);
        }
        Ok(FetchOutcome::Response(CacheResult::from_network(response)))
      }
      Err(err) => match self.storage.match_url(self.cache_name(), &key)? {
        Some(cached) => {
          debug!(url = %request.url, "Network failed, serving cached copy");
          Ok(FetchOutcome::Response(CacheResult::offline(
            cached.response,
            cached.cached_at,
          )))
        }
        None => Err(err),
      },
    }
  }

  async fn cache_first(&self, request: &Request) -> Result<FetchOutcome> {
    let key = self.cache_key(&request.url);
    if let Some(cached) = self.storage.match_url(self.cache_name(), &key)? {
      return Ok(FetchOutcome::Response(CacheResult::from_cache(
        cached.response,
        cached.cached_at,
      )));
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        // Only same-origin 200s are worth keeping
        if response.status == 200 && response.kind == ResponseKind::Basic {
          if let Err(e) = self.storage.put(self.cache_name(), &key, &response) {
            warn!(url = %request.url, "Failed to cache response: {}", e);
          }
        }
        Ok(FetchOutcome::Response(CacheResult::from_network(response)))
      }
      Err(err) => {
        debug!(url = %request.url, "Network failed on cache miss: {}", err);
        if request.mode == RequestMode::Navigate {
          let offline_key = self.cache_key(&self.config.offline_url);
          if let Some(page) = self.storage.match_url(self.cache_name(), &offline_key)? {
            return Ok(FetchOutcome::Response(CacheResult::fallback(
              page.response,
              page.cached_at,
            )));
          }
        }
        Ok(FetchOutcome::NoResponse)
      }
    }
  }
}

impl<S: CacheStorage, F: Fetcher> Clone for OfflineGateway<S, F> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      queue: self.queue.clone(),
      config: Arc::clone(&self.config),
      origin: Arc::clone(&self.origin),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::gateway::http::testing::StubFetcher;
  use crate::gateway::outcome::CacheSource;
  use crate::gateway::storage::SqliteStorage;

  const ORIGIN: &str = "http://localhost:8080";

  fn gateway_with(config: GatewayConfig) -> (OfflineGateway<SqliteStorage, StubFetcher>, Arc<StubFetcher>) {
    let db = Database::open_in_memory().unwrap();
    let fetcher = Arc::new(StubFetcher::new());
    let gateway = OfflineGateway::new(
      SqliteStorage::new(db.clone()),
      Arc::clone(&fetcher),
      PendingQueue::new(db),
      config,
      Url::parse(ORIGIN).unwrap(),
    );
    (gateway, fetcher)
  }

  fn gateway() -> (OfflineGateway<SqliteStorage, StubFetcher>, Arc<StubFetcher>) {
    gateway_with(GatewayConfig {
      precache: vec!["/index.html".into(), "/loading.html".into()],
      ..GatewayConfig::default()
    })
  }

  fn html(body: &str) -> Response {
    Response::new(200, Some("text/html"), body)
  }

  #[tokio::test]
  async fn test_precached_asset_is_served_without_network() {
    let (gateway, fetcher) = gateway();
    fetcher.route("/index.html", html("home"));
    fetcher.route("/loading.html", html("loading"));
    assert_eq!(gateway.install().await.unwrap(), 2);

    let calls_after_install = fetcher.call_count();
    let outcome = gateway.handle(&Request::get("/index.html")).await.unwrap();

    assert_eq!(outcome.source(), Some(CacheSource::Cache));
    assert_eq!(outcome.response().unwrap().body, b"home");
    assert_eq!(fetcher.call_count(), calls_after_install);
  }

  #[tokio::test]
  async fn test_install_failure_writes_nothing() {
    let (gateway, fetcher) = gateway();
    fetcher.route("/index.html", html("home"));
    // /loading.html is unrouted and answers 404

    assert!(gateway.install().await.is_err());
    assert!(gateway.storage().cache_names().unwrap().is_empty());
    assert!(gateway
      .storage()
      .match_url(gateway.cache_name(), &gateway.cache_key("/index.html"))
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_absolute_and_fragment_urls_hit_precached_asset() {
    let (gateway, fetcher) = gateway();
    fetcher.route("/index.html", html("home"));
    fetcher.route("/loading.html", html("loading"));
    gateway.install().await.unwrap();
    fetcher.set_online(false);
    let calls = fetcher.call_count();

    for url in [
      "http://localhost:8080/index.html",
      "/index.html#top",
      "index.html",
    ] {
      let outcome = gateway.handle(&Request::navigate(url)).await.unwrap();
      assert_eq!(outcome.source(), Some(CacheSource::Cache), "{}", url);
      assert_eq!(outcome.response().unwrap().body, b"home");
    }
    assert_eq!(fetcher.call_count(), calls);
  }

  #[test]
  fn test_cache_key_normalizes_urls() {
    let (gateway, _fetcher) = gateway();
    assert_eq!(
      gateway.cache_key("/index.html#top"),
      "http://localhost:8080/index.html"
    );
    assert_eq!(
      gateway.cache_key("https://unpkg.com/leaflet@1.9.4/dist/leaflet.js#x"),
      "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"
    );
    assert_eq!(gateway.cache_key("/api/suppliers?x=1"), "http://localhost:8080/api/suppliers?x=1");
  }

  #[tokio::test]
  async fn test_install_offline_fails() {
    let (gateway, fetcher) = gateway();
    fetcher.set_online(false);
    assert!(gateway.install().await.is_err());
  }

  #[tokio::test]
  async fn test_cache_miss_stores_basic_200_only() {
    let (gateway, fetcher) = gateway();
    fetcher.route("/assets/app.js", Response::new(200, Some("text/javascript"), "js"));
    fetcher.route(
      "https://cdn.example/lib.js",
      Response {
        kind: ResponseKind::Cors,
        ..Response::new(200, Some("text/javascript"), "lib")
      },
    );

    let first = gateway.handle(&Request::get("/assets/app.js")).await.unwrap();
    assert_eq!(first.source(), Some(CacheSource::Network));
    let second = gateway.handle(&Request::get("/assets/app.js")).await.unwrap();
    assert_eq!(second.source(), Some(CacheSource::Cache));

    gateway
      .handle(&Request::get("https://cdn.example/lib.js"))
      .await
      .unwrap();
    let missing = gateway.handle(&Request::get("/missing.png")).await.unwrap();
    assert_eq!(missing.response().unwrap().status, 404);

    let storage = gateway.storage();
    assert!(storage
      .match_url(gateway.cache_name(), "https://cdn.example/lib.js")
      .unwrap()
      .is_none());
    assert!(storage
      .match_url(gateway.cache_name(), &gateway.cache_key("/missing.png"))
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_offline_navigation_falls_back_to_offline_page() {
    let (gateway, fetcher) = gateway();
    fetcher.route("/index.html", html("home"));
    fetcher.route("/loading.html", html("loading"));
    gateway.install().await.unwrap();
    fetcher.set_online(false);

    let page = gateway.handle(&Request::navigate("/pedidos")).await.unwrap();
    assert_eq!(page.source(), Some(CacheSource::Fallback));
    assert_eq!(page.response().unwrap().body, b"loading");

    let asset = gateway.handle(&Request::get("/pedidos.css")).await.unwrap();
    assert!(matches!(asset, FetchOutcome::NoResponse));
  }

  #[tokio::test]
  async fn test_api_is_network_first_with_cache_fallback() {
    let (gateway, fetcher) = gateway();

    // Nothing cached yet: offline failure propagates
    fetcher.set_online(false);
    assert!(gateway.handle(&Request::get("/api/suppliers")).await.is_err());

    fetcher.set_online(true);
    fetcher.route("/api/suppliers", Response::json("[1]"));
    let live = gateway.handle(&Request::get("/api/suppliers")).await.unwrap();
    assert_eq!(live.source(), Some(CacheSource::Network));

    // Online again with a newer body: the network still wins over the cache
    fetcher.route("/api/suppliers", Response::json("[1,2]"));
    let calls = fetcher.call_count();
    let fresh = gateway.handle(&Request::get("/api/suppliers")).await.unwrap();
    assert_eq!(fresh.response().unwrap().body, b"[1,2]");
    assert_eq!(fetcher.call_count(), calls + 1);

    fetcher.set_online(false);
    let offline = gateway.handle(&Request::get("/api/suppliers")).await.unwrap();
    assert_eq!(offline.source(), Some(CacheSource::Offline));
    assert_eq!(offline.response().unwrap().body, b"[1,2]");
  }

  #[tokio::test]
  async fn test_failed_order_post_is_queued() {
    let (gateway, fetcher) = gateway();
    fetcher.set_online(false);

    let outcome = gateway
      .handle(&Request::post_json("/api/orders", b"{\"total\":\"12.90\"}".to_vec()))
      .await
      .unwrap();
    assert!(matches!(
      outcome,
      FetchOutcome::Queued {
        kind: RequestKind::Order,
        ..
      }
    ));

    let pending = gateway.queue().pending(RequestKind::Order).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, b"{\"total\":\"12.90\"}");
  }

  #[tokio::test]
  async fn test_other_failed_writes_propagate() {
    let (gateway, fetcher) = gateway();
    fetcher.set_online(false);

    let result = gateway
      .handle(&Request::post_json("/api/contact", b"{}".to_vec()))
      .await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_activate_purges_old_versions_once() {
    let (gateway, _fetcher) = gateway();
    let storage = gateway.storage();
    storage.put("carvao-delivery-v0", "/index.html", &html("old")).unwrap();
    storage.put(gateway.cache_name(), "/index.html", &html("new")).unwrap();

    assert_eq!(gateway.activate().unwrap(), vec!["carvao-delivery-v0".to_string()]);
    assert!(gateway.activate().unwrap().is_empty());
    assert_eq!(
      storage.cache_names().unwrap(),
      vec![gateway.cache_name().to_string()]
    );
  }

  #[tokio::test]
  async fn test_refresh_suppliers_caches_payload() {
    let (gateway, fetcher) = gateway();
    fetcher.route("/api/suppliers/update", Response::json("{\"count\": 3}"));

    gateway.refresh_suppliers().await.unwrap();

    let cached = gateway
      .storage()
      .match_url(gateway.cache_name(), "http://localhost:8080/api/suppliers")
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"{\"count\":3}");
  }
}
