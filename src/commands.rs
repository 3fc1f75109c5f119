//! Outbound playback commands of one player.
//!
//! Every command is a single `POST` sent from its own task. Nothing waits
//! for it and nothing changes locally: if the command took effect, the
//! backend will push a snapshot saying so. Failures are logged and
//! otherwise dropped; they are never retried.

use tokio::task::JoinHandle;

use crate::{
    api::Api,
    protocol::{Command, PlayerId},
};

/// Command sender bound to a single player.
///
/// Cheap to clone, and usable from any task.
#[derive(Clone, Debug)]
pub struct Commands {
    api: Api,
    id: PlayerId,
}

impl Commands {
    #[must_use]
    pub fn new(api: Api, id: PlayerId) -> Self {
        Self { api, id }
    }

    #[must_use]
    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn play_pause(&self) -> JoinHandle<()> {
        self.send(Command::PlayPause)
    }

    pub fn next(&self) -> JoinHandle<()> {
        self.send(Command::Next)
    }

    pub fn previous(&self) -> JoinHandle<()> {
        self.send(Command::Previous)
    }

    /// Moves the position by `delta` microseconds, backwards if negative.
    pub fn seek(&self, delta: i64) -> JoinHandle<()> {
        self.send(Command::Seek(delta))
    }

    /// Sets the volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, volume: f64) -> JoinHandle<()> {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.send(Command::Volume(volume))
    }

    /// Sends `command` in the background.
    ///
    /// The returned handle resolves once the backend answered or the
    /// request failed; dropping it does not cancel the command.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn send(&self, command: Command) -> JoinHandle<()> {
        let api = self.api.clone();
        let id = self.id.clone();

        tokio::spawn(async move {
            let url = api.command_url(&id, &command);
            debug!("{id}: sending {command}");

            let http = api.http();
            match http.execute(http.post(url)).await {
                Ok(response) if response.status().is_success() => {
                    trace!("{id}: {command} accepted");
                }
                Ok(response) => {
                    warn!("{id}: {command} refused with {}", response.status());
                }
                Err(e) => warn!("{id}: {command} failed: {e}"),
            }
        })
    }
}
