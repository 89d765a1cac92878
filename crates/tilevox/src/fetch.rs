//! The fetch capability and its HTTP implementation.
//!
//! Fetching never fails from the caller's point of view: transport errors,
//! bad status codes and cache failures are logged and reported as an empty
//! payload, which the resolver and pipeline treat as "no data here".

use crate::cache::{Cache, NoCache};
use crate::error::{Error, Result};
use crate::urls::tile_identifier;
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("tilevox/", env!("CARGO_PKG_VERSION"));

/// Content type tile services use for binary glTF.
const GLTF_BINARY: &str = "model/gltf-binary";

/// The outcome of fetching a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    /// The response's declared content type, when known.
    pub content_type: Option<String>,
}

impl Fetched {
    #[must_use]
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
        }
    }

    /// A fetch that produced nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the server declared the payload to be a binary mesh.
    #[must_use]
    pub fn is_declared_mesh(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with(GLTF_BINARY))
    }
}

/// Future type for fetch operations.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Fetched> + Send + 'a>>;

/// Something that can retrieve the bytes behind a URL.
pub trait Fetch: Send + Sync {
    /// Fetch `url`, returning an empty payload on any failure.
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        (**self).fetch(url)
    }
}

/// Fetches over HTTP(S), consulting a cache keyed by tile identifier.
pub struct HttpFetcher<C: Cache = NoCache> {
    http: reqwest::Client,
    cache: Arc<C>,
}

impl HttpFetcher<NoCache> {
    /// Create a fetcher with the default timeout and no caching.
    pub fn new() -> Result<Self> {
        Self::with_cache(NoCache, DEFAULT_TIMEOUT)
    }
}

impl<C: Cache> HttpFetcher<C> {
    /// Create a fetcher with a custom cache and request timeout.
    pub fn with_cache(cache: C, timeout: Duration) -> Result<Self> {
        Ok(Self::with_http_and_cache(build_client(timeout)?, cache))
    }

    /// Create a fetcher from an existing HTTP client.
    #[must_use]
    pub fn with_http_and_cache(http: reqwest::Client, cache: C) -> Self {
        Self {
            http,
            cache: Arc::new(cache),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Fetched> {
        let key = tile_identifier(url);
        match self.cache.get(&key).await {
            Ok(Some(data)) => {
                tracing::debug!(url = %key, "cache hit");
                return Ok(Fetched::new(data, None));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(url = %key, error = %e, "cache lookup failed"),
        }

        tracing::debug!(url = %key, "fetching");

        let response = self.http.get(url).send().await.map_err(|e| Error::Http {
            url: key.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: key,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let data = response
            .bytes()
            .await
            .map_err(|e| Error::Http {
                url: key.clone(),
                message: e.to_string(),
            })?
            .to_vec();

        if !data.is_empty()
            && let Err(e) = self.cache.put(&key, data.clone()).await
        {
            tracing::warn!(url = %key, error = %e, "cache store failed");
        }

        Ok(Fetched::new(data, content_type))
    }
}

impl<C: Cache> Fetch for HttpFetcher<C> {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            match self.fetch_bytes(url).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::warn!(error = %e, "fetch failed");
                    Fetched::empty()
                }
            }
        })
    }
}

#[cfg(not(target_family = "wasm"))]
fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::Http {
            url: String::new(),
            message: format!("failed to build client: {e}"),
        })
}

#[cfg(target_family = "wasm")]
#[allow(clippy::unnecessary_wraps)]
fn build_client(_timeout: Duration) -> Result<reqwest::Client> {
    // The browser owns timeouts and the user agent.
    Ok(reqwest::Client::new())
}
