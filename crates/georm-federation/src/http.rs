//! HTTP remote sources.
//!
//! A remote catalog is reached with a plain GET. What URL to request and
//! how to turn the body into records is source specific and lives behind
//! [`RemoteSource`]; [`HttpFetcher`] only moves text and classifies status
//! codes.

use std::sync::Arc;

use async_trait::async_trait;
use georm_proto::{QueryRequest, Record};
use reqwest::{Client, Url};
use tracing::debug;

use crate::config::HttpSourceConfig;
use crate::error::Error;
use crate::provider::QueryProvider;

/// Source-specific request building and response parsing.
pub trait RemoteSource: Send + Sync {
    /// URL answering `request`.
    fn url(&self, request: &QueryRequest) -> Result<String, Error>;

    /// Records contained in a response body.
    fn parse(&self, body: &str, request: &QueryRequest) -> Result<Vec<Record>, Error>;
}

/// Map an HTTP status to the fetch outcome.
///
/// 503 is reported as [`Error::ServiceUnavailable`]; any other non-2xx
/// status is a [`Error::Fetch`].
pub fn classify_status(status: u16, url: &str, body: &str) -> Result<(), Error> {
    match status {
        200..=299 => Ok(()),
        503 => Err(Error::ServiceUnavailable(url.to_string())),
        _ => Err(Error::Fetch {
            url: url.to_string(),
            message: format!("status {}: {}", status, truncate(body, 200)),
        }),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// GETs raw text from remote catalogs.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpSourceConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Fetch {
                url: config.endpoint.clone(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// GET `url` and return the body of a 2xx response.
    pub async fn get(&self, url: &str) -> Result<String, Error> {
        let fetch_error = |e: reqwest::Error| {
            let message = if e.is_timeout() {
                format!("request timed out: {}", e)
            } else if e.is_connect() {
                format!("failed to connect: {}", e)
            } else {
                e.to_string()
            };
            Error::Fetch {
                url: url.to_string(),
                message,
            }
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(fetch_error)?;
        debug!(url, status, bytes = body.len(), "remote response");
        classify_status(status, url, &body)?;
        Ok(body)
    }
}

/// A remote source answered over HTTP.
pub struct HttpProvider {
    fetcher: HttpFetcher,
    source: Arc<dyn RemoteSource>,
}

impl HttpProvider {
    pub fn new(fetcher: HttpFetcher, source: Arc<dyn RemoteSource>) -> Self {
        Self { fetcher, source }
    }
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryProvider for HttpProvider {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Record>, Error> {
        let url = self.source.url(request)?;
        let body = self.fetcher.get(&url).await?;
        self.source.parse(&body, request)
    }
}

/// A remote georm service: the request travels as JSON in the `request`
/// query parameter and the response is a JSON array of records.
#[derive(Debug, Clone)]
pub struct JsonRecordSource {
    endpoint: Url,
}

impl JsonRecordSource {
    pub fn new(endpoint: &str) -> Result<Self, Error> {
        let endpoint = Url::parse(endpoint).map_err(|e| Error::Fetch {
            url: endpoint.to_string(),
            message: format!("invalid endpoint: {}", e),
        })?;
        Ok(Self { endpoint })
    }
}

impl RemoteSource for JsonRecordSource {
    fn url(&self, request: &QueryRequest) -> Result<String, Error> {
        let json = serde_json::to_string(request).map_err(georm_proto::Error::from)?;
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("request", &json);
        Ok(url.into())
    }

    fn parse(&self, body: &str, request: &QueryRequest) -> Result<Vec<Record>, Error> {
        let records: Vec<Record> = serde_json::from_str(body)
            .map_err(|e| Error::Parse(format!("{}: {}", self.endpoint, e)))?;
        Ok(records
            .into_iter()
            .map(|mut record| {
                if record.class.is_empty() {
                    record.class = request.class.clone();
                }
                record
            })
            .collect())
    }
}
