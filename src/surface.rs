//! Presentation surfaces.
//!
//! A [`Surface`] is where one player's state ends up: a widget, a terminal
//! line, a status bar segment. The core only ever writes to it; a surface
//! has no way to talk back; user input goes through
//! [`Commands`](crate::commands::Commands) instead.
//!
//! Surfaces are created by a [`Mount`], once per player, and receive
//! [`detach`](Surface::detach) exactly once when their player goes away.

use std::fmt;

use url::Url;

use crate::protocol::{Percentage, PlayerId, Snapshot};

/// Everything a surface shows except progress and artwork.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields {
    pub title: String,
    pub can_go_prev: bool,
    pub can_go_next: bool,
    pub can_seek: bool,

    /// `None` if the player has no volume control.
    pub volume: Option<Percentage>,

    /// Length of the track in microseconds, `0` when unknown.
    pub length: i64,
}

impl Fields {
    /// Formatted volume, such as `"50%"`.
    #[must_use]
    pub fn volume_text(&self) -> Option<String> {
        self.volume.map(|volume| volume.to_string())
    }

    /// Ratio of `position` to the track length in `[0, 1]`, if the length is
    /// known.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn progress(&self, position: i64) -> Option<Percentage> {
        (self.length > 0).then(|| {
            let ratio = position as f64 / self.length as f64;
            Percentage::from_ratio(ratio.clamp(0.0, 1.0))
        })
    }
}

impl From<&Snapshot> for Fields {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            title: snapshot.title.clone(),
            can_go_prev: snapshot.can_go_prev,
            can_go_next: snapshot.can_go_next,
            can_seek: snapshot.can_seek,
            volume: snapshot.volume(),
            length: snapshot.length.max(0),
        }
    }
}

/// Write-only view of one player.
///
/// All methods are called from the player's own task, one at a time, so
/// implementations need no synchronization of their own. They must not
/// block.
pub trait Surface: Send {
    /// Shows the non-progress state. Called for every snapshot.
    fn render(&mut self, fields: &Fields);

    /// Shows the playback position in microseconds. Called on every frame
    /// while playing.
    fn render_position(&mut self, position: i64);

    /// Shows the artwork at `url`, or removes it on `None`.
    ///
    /// Called only when the artwork changed.
    fn render_artwork(&mut self, url: Option<&Url>);

    /// Removes the surface. Nothing is called after this.
    fn detach(&mut self);
}

/// Creates surfaces for newly tracked players.
pub trait Mount {
    fn mount(&mut self, id: &PlayerId) -> Box<dyn Surface>;
}

impl<F> Mount for F
where
    F: FnMut(&PlayerId) -> Box<dyn Surface>,
{
    fn mount(&mut self, id: &PlayerId) -> Box<dyn Surface> {
        self(id)
    }
}

/// Microseconds formatted as `m:ss`, or `h:mm:ss` from one hour on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timestamp(pub i64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.0.max(0) / 1_000_000;
        let (hours, minutes, seconds) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
        if hours > 0 {
            write!(f, "{hours}:{minutes:02}:{seconds:02}")
        } else {
            write!(f, "{minutes}:{seconds:02}")
        }
    }
}
