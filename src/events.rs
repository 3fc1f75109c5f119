//! Events delivered by a player's push channel.
//!
//! A [`StreamClient`](crate::stream::StreamClient) turns the raw
//! Server-Sent Events of one player into these:
//!
//! * [`Update`](Event::Update) - A new [`Snapshot`] arrived
//! * [`End`](Event::End) - The channel terminated; delivered exactly once,
//!   and always last
//!
//! # Example
//!
//! ```rust
//! use playerbar::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::Update(snapshot) => println!("{}", snapshot.title),
//!         Event::End(reason) => println!("player gone: {reason}"),
//!     }
//! }
//! ```

use std::fmt;

use crate::protocol::Snapshot;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The backend pushed a new state report.
    Update(Snapshot),

    /// The channel terminated and will deliver nothing more.
    End(EndReason),
}

/// Why a push channel terminated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The backend sent `end`: the player is gone.
    Ended,

    /// The backend closed the response body without sending `end`.
    Closed,

    /// The backend refused the subscription with an HTTP status.
    Refused(u16),

    /// The connection failed or broke off.
    Failed(String),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ended => write!(f, "player ended"),
            Self::Closed => write!(f, "stream closed by backend"),
            Self::Refused(status) => write!(f, "subscription refused with status {status}"),
            Self::Failed(e) => write!(f, "stream failed: {e}"),
        }
    }
}
