//! Request/response model and the network boundary.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::future::Future;
use url::Url;

/// How the request was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  #[default]
  Other,
}

/// An outbound request as seen by the gateway
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  /// Absolute URL or origin-relative path
  pub url: String,
  pub mode: RequestMode,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      url: url.into(),
      mode: RequestMode::Other,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn navigate(url: impl Into<String>) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  /// POST with a JSON body
  pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
    Self {
      method: Method::POST,
      body: Some(body),
      ..Self::get(url)
    }
    .with_header("Content-Type", "application/json")
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Path component of the URL, for route matching
  pub fn path(&self) -> String {
    match Url::parse(&self.url) {
      Ok(url) => url.path().to_string(),
      Err(_) => self
        .url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string(),
    }
  }
}

/// Whether the response came from the app's own origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
  Basic,
  Cors,
}

impl ResponseKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
    }
  }

  pub fn parse(s: &str) -> Self {
    match s {
      "basic" => Self::Basic,
      _ => Self::Cors,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub kind: ResponseKind,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      content_type: content_type.map(String::from),
      kind: ResponseKind::Basic,
      body: body.into(),
    }
  }

  pub fn json(body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, Some("application/json"), body)
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Issues requests over the network.
///
/// An `Err` means the request never completed (offline, DNS, reset);
/// HTTP error statuses are returned as responses.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Fetcher backed by `reqwest`, resolving relative URLs against the app origin.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(origin: &str) -> Result<Self> {
    let origin = Url::parse(origin).map_err(|e| eyre!("Invalid origin {}: {}", origin, e))?;
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  fn prepare(&self, request: &Request) -> Result<(reqwest::RequestBuilder, ResponseKind)> {
    let url = self
      .origin
      .join(&request.url)
      .map_err(|e| eyre!("Invalid request URL {}: {}", request.url, e))?;

    let kind = if url.origin() == self.origin.origin() {
      ResponseKind::Basic
    } else {
      ResponseKind::Cors
    };

    let mut builder = self.client.request(request.method.clone(), url);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    Ok((builder, kind))
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    let prepared = self.prepare(request);
    let url = request.url.clone();

    async move {
      let (builder, kind) = prepared?;

      let response = builder
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

      let status = response.status().as_u16();
      let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?
        .to_vec();

      Ok(Response {
        status,
        content_type,
        kind,
        body,
      })
    }
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Mutex;

  /// In-process network with a connectivity switch and a call log.
  pub struct StubFetcher {
    routes: Mutex<HashMap<String, Response>>,
    online: AtomicBool,
    calls: Mutex<Vec<Request>>,
  }

  impl StubFetcher {
    pub fn new() -> Self {
      Self {
        routes: Mutex::new(HashMap::new()),
        online: AtomicBool::new(true),
        calls: Mutex::new(Vec::new()),
      }
    }

    pub fn route(&self, url: &str, response: Response) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
      self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Request> {
      self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }

    fn respond(&self, request: &Request) -> Result<Response> {
      self.calls.lock().unwrap().push(request.clone());
      if !self.online.load(Ordering::SeqCst) {
        return Err(eyre!("network unreachable: {}", request.url));
      }
      Ok(
        self
          .routes
          .lock()
          .unwrap()
          .get(&request.url)
          .cloned()
          .unwrap_or_else(|| Response::new(404, Some("text/plain"), "not found")),
      )
    }
  }

  impl Fetcher for StubFetcher {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
      let result = self.respond(request);
      async move { result }
    }
  }
}
