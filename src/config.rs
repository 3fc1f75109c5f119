//! Client configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! whatever the command line overrides. All fields of the file are optional.
//!
//! ```toml
//! base_url = "http://192.168.2.2:3000/"
//! api_prefix = "api"
//! frame_rate = 30
//! ```

use std::{fs, num::NonZeroU32, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root URL of the media-control backend.
    pub base_url: Url,

    /// Path prefix of all backend routes, without slashes. Empty when the
    /// backend serves its routes at the root.
    pub api_prefix: String,

    /// Display frames per second while progress is being extrapolated.
    pub frame_rate: NonZeroU32,

    /// Commands per second that may be sent to the backend.
    pub command_rate_limit: NonZeroU32,

    #[serde(skip)]
    pub app_name: String,
    #[serde(skip)]
    pub app_version: String,
    #[serde(skip)]
    pub user_agent: String,
}

impl Config {
    /// Default backend location.
    pub const DEFAULT_BASE_URL: &'static str = "http://127.0.0.1:3000/";

    /// Default route prefix.
    pub const DEFAULT_API_PREFIX: &'static str = "api";

    /// Refresh rate of common displays.
    pub const DEFAULT_FRAME_RATE: u32 = 60;

    pub const DEFAULT_COMMAND_RATE_LIMIT: u32 = 10;

    /// Configuration files are tiny; anything larger is not ours.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    /// Loads a configuration from a TOML file, filling in defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - the file cannot be read or is larger than 16 KiB
    /// - the file is not valid TOML or contains unknown fields
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: configuration file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::resource_exhausted(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `contents` is not a valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.with_identity();
        Ok(config)
    }

    /// Overrides the backend location.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `url` cannot be used as a base URL.
    pub fn set_base_url(&mut self, url: &str) -> Result<()> {
        let url = Url::parse(url)?;
        if url.cannot_be_a_base() {
            return Err(Error::invalid_argument(format!("{url} cannot be a base URL")));
        }
        self.base_url = url;
        Ok(())
    }

    /// Interval between two display frames.
    #[must_use]
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.get()
    }

    /// Fills in the fields that describe this client to the backend.
    fn with_identity(&mut self) {
        self.app_name = env!("CARGO_PKG_NAME").to_owned();
        self.app_version = env!("CARGO_PKG_VERSION").to_owned();

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };

        // `User-Agent` parts may not contain separators.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.is_empty() && !version.contains(illegal_chars))
            .unwrap_or_else(|| String::from("0"));

        self.user_agent = format!(
            "{}/{} (Rust; {os_name}/{os_version})",
            self.app_name, self.app_version
        );
        trace!("user agent: {}", self.user_agent);
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            base_url: Url::parse(Self::DEFAULT_BASE_URL).expect("invalid default base url"),
            api_prefix: Self::DEFAULT_API_PREFIX.to_owned(),
            frame_rate: NonZeroU32::new(Self::DEFAULT_FRAME_RATE).unwrap_or(NonZeroU32::MIN),
            command_rate_limit: NonZeroU32::new(Self::DEFAULT_COMMAND_RATE_LIMIT)
                .unwrap_or(NonZeroU32::MIN),
            app_name: String::new(),
            app_version: String::new(),
            user_agent: String::new(),
        };
        config.with_identity();
        config
    }
}
