//! HTTP client with command rate limiting.
//!
//! Wraps `reqwest::Client` to add:
//! * A rate limiter for commands, so that a held-down key or a scrubbing
//!   gesture cannot flood the backend with `POST`s
//! * Consistent keepalive and `User-Agent`
//!
//! Long-lived push subscriptions and one-off fetches bypass the limiter
//! through [`Client::unlimited`].
//!
//! # Example
//!
//! ```rust
//! use playerbar::http::Client;
//!
//! let client = Client::new(&config)?;
//! let request = client.post(url);
//! let response = client.execute(request).await?;
//! ```

use std::{fmt, future::Future, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    header::{HeaderValue, ACCEPT, CACHE_CONTROL},
    Method, Url,
};

use crate::{config::Config, error::Result};

pub struct Client {
    /// Request client without rate limiting, for subscriptions and fetches.
    pub unlimited: reqwest::Client,

    /// Limits commands to the configured number per second.
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Duration to keep idle connections alive.
    ///
    /// Commands are sparse but come in bursts; keeping the connection open
    /// saves a handshake per click.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// `Accept` value of push subscriptions.
    pub const EVENT_STREAM: HeaderValue = HeaderValue::from_static("text/event-stream");

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built, for
    /// example when the TLS backend fails to initialize.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .user_agent(&config.user_agent)
            .build()?;

        // Burst up to a full second worth of commands.
        let quota = Quota::per_second(config.command_rate_limit)
            .allow_burst(config.command_rate_limit);

        Ok(Self {
            unlimited: http_client,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method and URL, and an empty body.
    pub fn request(&self, method: Method, url: Url) -> reqwest::Request {
        reqwest::Request::new(method, url)
    }

    /// Builds a POST request.
    pub fn post(&self, url: Url) -> reqwest::Request {
        self.request(Method::POST, url)
    }

    /// Builds a GET request.
    pub fn get(&self, url: Url) -> reqwest::Request {
        self.request(Method::GET, url)
    }

    /// Builds a GET request for a Server-Sent Events subscription.
    pub fn subscribe(&self, url: Url) -> reqwest::Request {
        let mut request = self.get(url);

        let headers = request.headers_mut();
        headers.insert(ACCEPT, Self::EVENT_STREAM);
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        request
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * The backend cannot be reached
    /// * The request fails in transit
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }

    /// Executes a request without rate limiting and checks that the backend
    /// answered with a success status.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the status is not a success.
    pub async fn fetch(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let response = self.unlimited.execute(request).await?;
        Ok(response.error_for_status()?)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("unlimited", &self.unlimited)
            .finish_non_exhaustive()
    }
}
