//! Per-player controller.
//!
//! A [`Controller`] binds one player's [`StreamClient`] to its [`Surface`]:
//!
//! * every snapshot renders the non-progress [`Fields`] and, if the artwork
//!   fingerprint changed, the artwork location
//! * snapshots drive the [`Extrapolator`], whose frames render the position
//!   while playing
//! * a paused player shows exactly the position it reported
//!
//! The controller runs as a single task: stream events and display frames
//! are handled one after the other, so its state needs no locking. It runs
//! until the stream terminates or its owner detaches it, and tears down
//! exactly once: the stream is closed, the frame task cancelled and the
//! surface detached.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    api::Api,
    commands::Commands,
    events::{EndReason, Event},
    extrapolator::{Extrapolator, Transition},
    protocol::{PlayerId, Snapshot},
    stream::StreamClient,
    surface::{Fields, Surface},
};

/// Why a controller stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Teardown {
    /// The stream terminated.
    Ended(EndReason),

    /// The owner detached the controller.
    Detached,
}

pub struct Controller {
    api: Api,
    stream: StreamClient,
    extrapolator: Extrapolator,
    surface: Box<dyn Surface>,
    commands: Commands,

    /// Artwork fingerprint last passed to the surface.
    art_url_hash: Option<String>,
}

impl Controller {
    #[must_use]
    pub fn new(
        api: Api,
        stream: StreamClient,
        surface: Box<dyn Surface>,
        frame_period: Duration,
    ) -> Self {
        let commands = Commands::new(api.clone(), stream.id().clone());

        Self {
            api,
            stream,
            extrapolator: Extrapolator::new(frame_period),
            surface,
            commands,
            art_url_hash: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &PlayerId {
        self.stream.id()
    }

    /// Command sender of this player, usable before and while it runs.
    #[must_use]
    pub fn commands(&self) -> Commands {
        self.commands.clone()
    }

    /// Runs until the stream terminates or `detach` is cancelled, then tears
    /// down.
    pub async fn run(mut self, detach: CancellationToken) -> Teardown {
        debug!("{}: controller started", self.id());

        let teardown = loop {
            tokio::select! {
                biased;

                () = detach.cancelled() => break Teardown::Detached,

                event = self.stream.next_event() => match event {
                    Some(Event::Update(snapshot)) => self.on_snapshot(&snapshot),
                    Some(Event::End(reason)) => break Teardown::Ended(reason),
                    None => break Teardown::Ended(EndReason::Closed),
                },

                now = self.extrapolator.next_frame() => self.on_frame(now),
            }
        };

        self.teardown(&teardown);
        teardown
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot) {
        let now = Instant::now();

        self.surface.render(&Fields::from(snapshot));

        if self.art_url_hash != snapshot.art_url_hash {
            self.art_url_hash.clone_from(&snapshot.art_url_hash);

            let url = self
                .art_url_hash
                .as_deref()
                .map(|hash| self.api.icon_url(self.stream.id(), hash));
            debug!(
                "{}: artwork changed to {}",
                self.stream.id(),
                url.as_ref().map_or("none", |url| url.as_str())
            );
            self.surface.render_artwork(url.as_ref());
        }

        match self.extrapolator.on_snapshot(snapshot, now) {
            Transition::Started => {
                debug!("{}: playing from {}µs", self.id(), snapshot.position);
                if let Some(position) = self.extrapolator.tick(now) {
                    self.surface.render_position(position);
                }
            }
            Transition::Stopped => {
                debug!("{}: stopped at {}µs", self.id(), snapshot.position);
                self.surface.render_position(snapshot.position.max(0));
            }
            Transition::RateChanged => {
                debug!("{}: rate changed to {}", self.id(), snapshot.effective_rate());
            }
            Transition::Unchanged => {
                if !snapshot.running {
                    self.surface.render_position(snapshot.position.max(0));
                }
            }
        }
    }

    fn on_frame(&mut self, now: Instant) {
        if let Some(position) = self.extrapolator.tick(now) {
            trace!("{}: frame at {position}µs", self.id());
            self.surface.render_position(position);
        }
    }

    fn teardown(&mut self, teardown: &Teardown) {
        match teardown {
            Teardown::Ended(reason) => debug!("{}: tearing down: {reason}", self.id()),
            Teardown::Detached => debug!("{}: tearing down: detached", self.id()),
        }

        self.stream.close();
        self.extrapolator.stop();
        self.surface.detach();
    }
}
