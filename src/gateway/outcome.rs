//! What the gateway hands back for an intercepted request.

use chrono::{DateTime, Utc};

use super::http::Response;
use super::queue::RequestKind;

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Live response from the network
  Network,
  /// Cache hit on a cache-first route; the network was not consulted
  Cache,
  /// Network failed, serving the last cached copy
  Offline,
  /// Network failed on a navigation, serving the offline page
  Fallback,
}

/// A response plus metadata about its source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn fallback(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      cached_at: Some(cached_at),
    }
  }
}

/// Result of routing one request through the gateway
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  Response(CacheResult<Response>),
  /// The write failed offline and was stored for replay
  Queued { id: i64, kind: RequestKind },
  /// Offline with nothing cached to serve
  NoResponse,
}

#[cfg(test)]
impl FetchOutcome {
  pub fn response(&self) -> Option<&Response> {
    match self {
      Self::Response(result) => Some(&result.data),
      _ => None,
    }
  }

  pub fn source(&self) -> Option<CacheSource> {
    match self {
      Self::Response(result) => Some(result.source),
      _ => None,
    }
  }
}
