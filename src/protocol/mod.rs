//! Wire types of the media-control backend.
//!
//! # Submodules
//!
//! * [`command`] - One-shot playback commands and their routes
//! * [`snapshot`] - Player state reports pushed by the backend
//! * [`sse`] - Incremental decoder for the `text/event-stream` format
//!
//! The backend speaks plain JSON over HTTP: an array of player ids at
//! bootstrap, [`Snapshot`]s inside Server-Sent Events afterwards.

pub mod command;
pub mod snapshot;
pub mod sse;

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::error::{Error, Result};

pub use command::Command;
pub use snapshot::{Percentage, Snapshot};

/// Identifier of a remote player, as enumerated by the backend.
///
/// Opaque to the client. Ids typically are MPRIS bus names such as
/// `org.mpris.MediaPlayer2.firefox.instance_1_42`, so they may contain
/// characters that need escaping when used in a URL path.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PlayerId {
    type Err = Error;

    /// Parses a player id.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `s` is empty.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::invalid_argument("player id cannot be empty"));
        }
        Ok(Self(s.to_owned()))
    }
}

/// Parses and logs a JSON body from the backend.
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Schema mismatch: Logs the JSON value at TRACE level
/// * Invalid JSON: Logs the raw text at TRACE level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + fmt::Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: unexpected {json}");
            } else {
                trace!("{origin}: not json: {body}");
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_ids_from_list() {
        let ids: Vec<PlayerId> = json(r#"["a", "org.mpris.MediaPlayer2.vlc"]"#, "list").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1].as_str(), "org.mpris.MediaPlayer2.vlc");
    }

    #[test]
    fn empty_player_id_is_rejected() {
        assert!("".parse::<PlayerId>().is_err());
        assert_eq!("b".parse::<PlayerId>().unwrap().to_string(), "b");
    }
}
