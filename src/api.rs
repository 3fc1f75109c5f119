//! Routes of the media-control backend.
//!
//! ```text
//! GET  {base}/{prefix}/list                      → ["id", ...]
//! GET  {base}/{prefix}/metadata/{id}             → text/event-stream
//! GET  {base}/{prefix}/icon/{id}/{art_url_hash}  → image
//! POST {base}/{prefix}/{command}/{id}[/{arg}]
//! ```
//!
//! Player ids and hashes are pushed as single path segments, so any
//! character they contain is percent-encoded.

use std::sync::Arc;

use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{self, Command, PlayerId},
};

/// Backend endpoint addressing plus the HTTP client to reach it.
#[derive(Clone, Debug)]
pub struct Api {
    base: Url,
    prefix: Vec<String>,
    http: Arc<HttpClient>,
}

impl Api {
    /// # Errors
    ///
    /// Will return `Err` if the HTTP client cannot be built or the base URL
    /// cannot carry a path.
    pub fn new(config: &Config) -> Result<Self> {
        let http = HttpClient::new(config)?;
        Self::with_client(config, Arc::new(http))
    }

    /// Creates endpoint addressing that shares an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the base URL cannot carry a path.
    pub fn with_client(config: &Config, http: Arc<HttpClient>) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(Error::invalid_argument(format!(
                "{} cannot be a base URL",
                config.base_url
            )));
        }

        let prefix = config
            .api_prefix
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        Ok(Self {
            base: config.base_url.clone(),
            prefix,
            http,
        })
    }

    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Builds `{base}/{prefix}/{segments...}`.
    fn url<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base.clone();
        // Checked in the constructor.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(self.prefix.iter().map(String::as_str));
            path.extend(segments);
        }
        url
    }

    #[must_use]
    pub fn list_url(&self) -> Url {
        self.url(["list"])
    }

    #[must_use]
    pub fn metadata_url(&self, id: &PlayerId) -> Url {
        self.url(["metadata", id.as_str()])
    }

    #[must_use]
    pub fn icon_url(&self, id: &PlayerId, art_url_hash: &str) -> Url {
        self.url(["icon", id.as_str(), art_url_hash])
    }

    #[must_use]
    pub fn command_url(&self, id: &PlayerId, command: &Command) -> Url {
        let argument = command.argument();
        let mut segments = vec![command.route(), id.as_str()];
        if let Some(argument) = argument.as_deref() {
            segments.push(argument);
        }
        self.url(segments)
    }

    /// Enumerates the players the backend currently tracks, in its order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the backend cannot be reached, answers with an
    /// error status, or the body is not a JSON array of strings.
    pub async fn list(&self) -> Result<Vec<PlayerId>> {
        let url = self.list_url();
        debug!("listing players at {url}");

        let response = self.http.fetch(self.http.get(url)).await?;
        let body = response.text().await?;
        protocol::json(&body, "list")
    }
}
