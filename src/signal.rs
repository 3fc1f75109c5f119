//! Process signals of the watch loop.
//!
//! * Ctrl-C and SIGTERM detach every player and exit
//! * SIGHUP detaches every player and bootstraps again, picking up players
//!   that appeared since the last enumeration
//!
//! On platforms other than Unix only Ctrl-C is handled.

use std::fmt;

use crate::error::Result;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal as UnixSignal, SignalKind};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Signal {
    /// Ctrl-C (SIGINT)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Rescan,
}

impl Signal {
    /// Whether the process should exit.
    #[must_use]
    pub fn is_shutdown(self) -> bool {
        matches!(self, Self::Interrupt | Self::Terminate)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "Ctrl+C"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Rescan => write!(f, "SIGHUP"),
        }
    }
}

/// Listens for [`Signal`]s for as long as it lives.
pub struct Handler {
    #[cfg(unix)]
    sigterm: UnixSignal,
    #[cfg(unix)]
    sighup: UnixSignal,
}

impl Handler {
    /// # Errors
    ///
    /// Returns error if the signal handlers cannot be registered.
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                sigterm: signal(SignalKind::terminate())?,
                sighup: signal(SignalKind::hangup())?,
            })
        }

        #[cfg(not(unix))]
        Ok(Self {})
    }

    /// Waits for the next signal. Cancel safe.
    pub async fn recv(&mut self) -> Signal {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => Signal::Interrupt,
                _ = self.sigterm.recv() => Signal::Terminate,
                _ = self.sighup.recv() => Signal::Rescan,
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            Signal::Interrupt
        }
    }
}
