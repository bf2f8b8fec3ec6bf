//! Payload fetching
//!
//! Member payloads are pulled lazily from an upstream as the emitter
//! reaches each data region. [`PayloadFetcher`] is the seam: the HTTP
//! implementation resolves member URIs against a base URL and streams
//! response bodies, while tests substitute an in-memory fetcher.
//!
//! Dropping a payload stream cancels the underlying transfer.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Chunk stream for one member's payload bytes, in order.
pub type PayloadStream = BoxStream<'static, Result<Bytes>>;

/// Source of member payload bytes.
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    /// Begin fetching the payload for a member.
    ///
    /// `uri` is the decoded source locator from the member list; `args`
    /// are the undecoded query-equivalent arguments, empty when the
    /// member carried none.
    async fn fetch(&self, uri: &[u8], args: &[u8]) -> Result<PayloadStream>;
}

/// Fetches payloads over HTTP, resolving member URIs against a base URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    /// Create a fetcher for the given upstream base URL.
    ///
    /// No overall request timeout is set; payloads are unbounded streams
    /// and a fixed deadline would kill large members mid-transfer. The
    /// connect phase does time out.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Create a fetcher with a caller-configured client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn request_url(&self, uri: &[u8], args: &[u8]) -> Result<String> {
        let uri = std::str::from_utf8(uri)
            .map_err(|_| Error::InvalidUri(String::from_utf8_lossy(uri).into_owned()))?;
        let args = std::str::from_utf8(args)
            .map_err(|_| Error::InvalidUri(String::from_utf8_lossy(args).into_owned()))?;

        let mut url = format!("{}{}", self.base_url.trim_end_matches('/'), uri);
        if !args.is_empty() {
            url.push('?');
            url.push_str(args);
        }
        Ok(url)
    }
}

#[async_trait]
impl PayloadFetcher for HttpFetcher {
    async fn fetch(&self, uri: &[u8], args: &[u8]) -> Result<PayloadStream> {
        let url = self.request_url(uri, args)?;
        debug!(url, "fetching member payload");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamFailed {
                uri: url,
                status: status.as_u16(),
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed())
    }
}

/// In-memory fetcher serving fixed payloads, for tests and examples.
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    payloads: HashMap<Vec<u8>, Bytes>,
    chunk_size: usize,
}

impl StaticFetcher {
    /// Create an empty fetcher delivering each payload as one chunk.
    pub fn new() -> Self {
        Self {
            payloads: HashMap::new(),
            chunk_size: usize::MAX,
        }
    }

    /// Split payloads into chunks of at most `chunk_size` bytes, to
    /// exercise multi-chunk streaming paths.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Register a payload under a member URI.
    pub fn insert(mut self, uri: impl Into<Vec<u8>>, payload: impl Into<Bytes>) -> Self {
        self.payloads.insert(uri.into(), payload.into());
        self
    }
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PayloadFetcher for StaticFetcher {
    async fn fetch(&self, uri: &[u8], _args: &[u8]) -> Result<PayloadStream> {
        let Some(payload) = self.payloads.get(uri) else {
            return Err(Error::UpstreamFailed {
                uri: String::from_utf8_lossy(uri).into_owned(),
                status: 404,
            });
        };
        trace!(bytes = payload.len(), "serving static payload");

        let chunk_size = self.chunk_size;
        let mut rest = payload.clone();
        let chunks = std::iter::from_fn(move || {
            if rest.is_empty() {
                return None;
            }
            Some(Ok(rest.split_to(rest.len().min(chunk_size))))
        })
        .collect::<Vec<_>>();
        Ok(stream::iter(chunks).boxed())
    }
}
