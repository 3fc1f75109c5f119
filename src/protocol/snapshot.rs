//! Player state reports.
//!
//! A [`Snapshot`] is a complete description of one player at one instant.
//! The backend sends one whenever anything about the player changes, and
//! fields it cannot determine (no metadata loaded, no length known) are
//! sent as `null` or left out.

use std::fmt;

use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};

/// Complete, self-describing state report of one player.
///
/// Positions and lengths are in microseconds, as MPRIS reports them.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub title: String,

    /// Position at the time the backend took the snapshot.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub position: i64,

    /// Length of the current track, `0` when unknown.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub length: i64,

    /// Whether the player is playing.
    pub running: bool,

    /// Speed multiplier of playback; `None` when the player does not say.
    pub playback_rate: Option<f64>,

    pub can_go_prev: bool,
    pub can_go_next: bool,
    pub can_seek: bool,

    /// Whether `volume` carries a meaningful value.
    pub has_volume: bool,
    pub volume: f64,

    /// Fingerprint of the artwork location. A changed value means the
    /// artwork must be fetched again.
    pub art_url_hash: Option<String>,
}

impl Snapshot {
    /// Normal playback speed.
    pub const UNIT_RATE: f64 = 1.0;

    /// Playback rate to extrapolate with.
    ///
    /// An unknown rate is normal speed. Non-finite and negative rates do not
    /// advance the position.
    #[must_use]
    pub fn effective_rate(&self) -> f64 {
        match self.playback_rate {
            None => Self::UNIT_RATE,
            Some(rate) if rate.is_finite() && rate > 0.0 => rate,
            Some(_) => 0.0,
        }
    }

    /// Volume of the player, if it has one.
    #[must_use]
    pub fn volume(&self) -> Option<Percentage> {
        self.has_volume
            .then(|| Percentage::from_ratio(self.volume.clamp(0.0, 1.0)))
    }
}

/// A ratio in `[0, 1]` displayed as a percentage.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Percentage {
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        Self(ratio)
    }

    #[must_use]
    pub fn as_ratio(&self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn as_percent(&self) -> f64 {
        self.0 * 100.0
    }
}

impl fmt::Display for Percentage {
    /// Formats a `Percentage` rounded to whole percents with a `%` sign.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.as_percent())
    }
}
