//! Ownership of all tracked players.
//!
//! The [`Registry`] enumerates the backend's players once, mounts a surface
//! for each and runs one [`Controller`] task per player. It is the only
//! owner of those tasks: a controller that terminates reports its id back
//! through a channel, and the registry awaits and forgets it.
//!
//! There is no re-polling. Players that appear after bootstrap are not
//! picked up; a host that wants them bootstraps a new registry.

use std::{collections::HashSet, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    api::Api,
    commands::Commands,
    config::Config,
    controller::{Controller, Teardown},
    error::Result,
    events::EndReason,
    protocol::PlayerId,
    stream::StreamClient,
    surface::Mount,
};

/// Reports the end of a controller task to the registry.
///
/// Armed until the task decides what to report, so a task that unwinds
/// still reports its player as failed.
struct EndReport {
    id: Option<PlayerId>,
    tx: mpsc::UnboundedSender<(PlayerId, EndReason)>,
}

impl EndReport {
    fn send(mut self, reason: EndReason) {
        if let Some(id) = self.id.take() {
            // Only fails if the registry is gone already.
            let _ = self.tx.send((id, reason));
        }
    }

    fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for EndReport {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let _ = self
                .tx
                .send((id, EndReason::Failed("controller panicked".to_owned())));
        }
    }
}

/// A running controller.
#[derive(Debug)]
struct Player {
    id: PlayerId,
    commands: Commands,
    detach: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct Registry {
    api: Api,
    frame_period: Duration,
    players: Vec<Player>,
    ended_tx: mpsc::UnboundedSender<(PlayerId, EndReason)>,
    ended_rx: mpsc::UnboundedReceiver<(PlayerId, EndReason)>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(api: Api, frame_period: Duration) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        Self {
            api,
            frame_period,
            players: Vec::new(),
            ended_tx,
            ended_rx,
        }
    }

    /// Enumerates the players of the backend and mounts each of them, in
    /// the order the backend lists them.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the backend cannot be reached or its player list
    /// cannot be parsed. Problems with individual players are not errors:
    /// they end that player only.
    pub async fn bootstrap<M>(config: &Config, mount: &mut M) -> Result<Self>
    where
        M: Mount + ?Sized,
    {
        let api = Api::new(config)?;
        let ids = api.list().await?;
        info!("backend lists {} player(s)", ids.len());

        let mut registry = Self::new(api, config.frame_period());
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if seen.insert(id.clone()) {
                registry.mount(id, mount);
            } else {
                warn!("{id}: listed more than once, mounting once");
            }
        }

        Ok(registry)
    }

    fn mount<M>(&mut self, id: PlayerId, mount: &mut M)
    where
        M: Mount + ?Sized,
    {
        debug!("{id}: mounting");

        let surface = mount.mount(&id);
        let stream = StreamClient::open(&self.api, id.clone());
        let controller = Controller::new(self.api.clone(), stream, surface, self.frame_period);
        let commands = controller.commands();

        let detach = CancellationToken::new();
        let report = EndReport {
            id: Some(id.clone()),
            tx: self.ended_tx.clone(),
        };
        let task = tokio::spawn({
            let detach = detach.clone();
            async move {
                match controller.run(detach).await {
                    Teardown::Ended(reason) => report.send(reason),
                    Teardown::Detached => report.disarm(),
                }
            }
        });

        self.players.push(Player {
            id,
            commands,
            detach,
            task,
        });
    }

    /// Ids of the live players, in mount order.
    pub fn ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.iter().map(|player| &player.id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Command sender of player `id`, if it is live.
    #[must_use]
    pub fn commands(&self, id: &PlayerId) -> Option<Commands> {
        self.players
            .iter()
            .find(|player| player.id == *id)
            .map(|player| player.commands.clone())
    }

    /// Waits for the next player whose stream terminated, and removes it.
    ///
    /// A player whose controller panicked is reported as
    /// [`EndReason::Failed`]. Returns `None` without waiting when no player
    /// is live.
    ///
    /// Cancelling this method while it awaits a player's task removes that
    /// player without reporting it.
    pub async fn next_ended(&mut self) -> Option<(PlayerId, EndReason)> {
        while !self.players.is_empty() {
            // We hold a sender ourselves, so the channel never closes.
            let (id, reason) = self.ended_rx.recv().await?;

            // Detached in the meantime.
            let Some(index) = self.players.iter().position(|player| player.id == id) else {
                continue;
            };

            let player = self.players.remove(index);
            if let Err(e) = player.task.await {
                error!("{id}: controller failed: {e}");
            }

            info!("{id}: removed: {reason}");
            return Some((id, reason));
        }

        None
    }

    /// Waits until every player ended.
    pub async fn run_until_empty(&mut self) {
        while self.next_ended().await.is_some() {}
    }

    /// Tears down player `id`.
    ///
    /// Returns whether the player was live.
    pub async fn detach(&mut self, id: &PlayerId) -> bool {
        let Some(index) = self.players.iter().position(|player| player.id == *id) else {
            return false;
        };

        let player = self.players.remove(index);
        player.detach.cancel();
        if let Err(e) = player.task.await {
            error!("{id}: controller failed: {e}");
        }

        info!("{id}: detached");
        true
    }

    /// Tears down every player.
    pub async fn shutdown(&mut self) {
        if self.players.is_empty() {
            return;
        }

        debug!("detaching {} player(s)", self.players.len());
        for player in &self.players {
            player.detach.cancel();
        }

        for player in self.players.drain(..) {
            if let Err(e) = player.task.await {
                error!("{}: controller failed: {e}", player.id);
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for player in &self.players {
            player.detach.cancel();
        }
    }
}
