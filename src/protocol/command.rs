//! Playback commands.
//!
//! Commands are fire-and-forget `POST`s: the backend acknowledges nothing
//! and the next [`Snapshot`](super::Snapshot) tells whether a command took
//! effect.

use std::fmt;

/// A one-shot request to change the state of a player.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    /// Toggle between playing and paused.
    PlayPause,

    /// Skip to the previous track.
    Previous,

    /// Skip to the next track.
    Next,

    /// Move the position by a signed number of microseconds.
    Seek(i64),

    /// Set the volume to a ratio in `[0, 1]`.
    Volume(f64),
}

impl Command {
    /// Route segment of this command, before the player id.
    #[must_use]
    pub fn route(&self) -> &'static str {
        match self {
            Self::PlayPause => "playpause",
            Self::Previous => "prev",
            Self::Next => "next",
            Self::Seek(_) => "seek",
            Self::Volume(_) => "volume",
        }
    }

    /// Route segment after the player id, if the command has an argument.
    #[must_use]
    pub fn argument(&self) -> Option<String> {
        match self {
            Self::PlayPause | Self::Previous | Self::Next => None,
            Self::Seek(offset) => Some(offset.to_string()),
            Self::Volume(volume) => Some(volume.clamp(0.0, 1.0).to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayPause => write!(f, "play/pause"),
            Self::Previous => write!(f, "previous"),
            Self::Next => write!(f, "next"),
            Self::Seek(offset) => write!(f, "seek {offset:+}µs"),
            Self::Volume(volume) => write!(f, "volume {:.0}%", volume * 100.0),
        }
    }
}
