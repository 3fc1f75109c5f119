//! Push-channel subscription of a single player.
//!
//! A [`StreamClient`] owns one `GET metadata/{id}` Server-Sent Events
//! subscription and hands out typed [`Event`]s:
//!
//! * `update` messages become [`Event::Update`]; malformed payloads are
//!   logged and skipped
//! * an `end` message, an error status, a transport error or the end of the
//!   response body become a single, final [`Event::End`]
//!
//! The subscription is read by a background task that never touches the
//! owner's state; events reach the owner through a channel in wire order.
//! [`close`](StreamClient::close) stops the task immediately, and no event is
//! handed out after it, not even one that was already decoded. Dropping the
//! client closes it.
//!
//! There is no reconnect: a terminated stream means the player is gone.

use futures_util::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    api::Api,
    events::{EndReason, Event},
    protocol::{self, sse, PlayerId, Snapshot},
};

#[derive(Debug)]
pub struct StreamClient {
    id: PlayerId,
    events: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    ended: bool,
}

impl StreamClient {
    /// Number of decoded events that may wait for the owner.
    ///
    /// The reader applies backpressure to the socket beyond this.
    const CHANNEL_CAPACITY: usize = 16;

    /// Event name of state reports.
    pub const UPDATE: &'static str = "update";

    /// Event name of the termination notice.
    pub const END: &'static str = "end";

    /// Subscribes to the state reports of player `id`.
    ///
    /// Returns immediately; connection failures are reported as
    /// [`Event::End`].
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    #[must_use]
    pub fn open(api: &Api, id: PlayerId) -> Self {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let url = api.metadata_url(&id);
        debug!("{id}: subscribing to {url}");

        let request = api.http().subscribe(url);
        let client = api.http().unlimited.clone();
        let reader = tokio::spawn(read(client, request, tx, cancel.clone(), id.clone()));

        Self {
            id,
            events: rx,
            cancel,
            reader: Some(reader),
            ended: false,
        }
    }

    /// Wraps a channel of already decoded events, for transports other than
    /// HTTP.
    ///
    /// Closing the sender without sending [`Event::End`] is reported as a
    /// failed stream.
    #[must_use]
    pub fn from_receiver(id: PlayerId, events: mpsc::Receiver<Event>) -> Self {
        Self {
            id,
            events,
            cancel: CancellationToken::new(),
            reader: None,
            ended: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    /// Whether the stream was closed by its owner or terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.ended || self.cancel.is_cancelled()
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the stream was closed or after [`Event::End`]
    /// was handed out. This method is cancel safe.
    pub async fn next_event(&mut self) -> Option<Event> {
        if self.is_closed() {
            return None;
        }

        let event = self.events.recv().await;
        if self.cancel.is_cancelled() {
            return None;
        }

        match event {
            Some(Event::Update(snapshot)) => Some(Event::Update(snapshot)),
            Some(Event::End(reason)) => {
                self.ended = true;
                self.events.close();
                Some(Event::End(reason))
            }
            None => {
                // The reader went away without saying goodbye.
                self.ended = true;
                Some(Event::End(EndReason::Failed(
                    "event channel closed".to_owned(),
                )))
            }
        }
    }

    /// Closes the subscription.
    ///
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!("{}: closing stream", self.id);
        }

        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.events.close();
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reads the subscription until it terminates or is cancelled, then reports
/// the termination unless cancelled.
async fn read(
    client: reqwest::Client,
    request: reqwest::Request,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    id: PlayerId,
) {
    let reason = tokio::select! {
        biased;

        () = cancel.cancelled() => return,
        reason = pump(&client, request, &tx, &id) => reason,
    };

    if let Some(reason) = reason {
        match reason {
            EndReason::Ended => info!("{id}: {reason}"),
            _ => error!("{id}: {reason}"),
        }

        if !cancel.is_cancelled() {
            // The receiver may be gone already; nobody to tell then.
            let _ = tx.send(Event::End(reason)).await;
        }
    }
}

/// Forwards decoded events until the stream terminates.
///
/// Returns `None` when the receiving side went away.
async fn pump(
    client: &reqwest::Client,
    request: reqwest::Request,
    tx: &mpsc::Sender<Event>,
    id: &PlayerId,
) -> Option<EndReason> {
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => return Some(EndReason::Failed(e.to_string())),
    };

    let status = response.status();
    if !status.is_success() {
        return Some(EndReason::Refused(status.as_u16()));
    }
    debug!("{id}: subscribed");

    let mut body = response.bytes_stream();
    let mut decoder = sse::Decoder::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return Some(EndReason::Failed(e.to_string())),
        };

        for message in decoder.decode(&chunk) {
            match message.event.as_str() {
                StreamClient::UPDATE => {
                    match protocol::json::<Snapshot>(&message.data, StreamClient::UPDATE) {
                        Ok(snapshot) => {
                            if tx.send(Event::Update(snapshot)).await.is_err() {
                                return None;
                            }
                        }
                        Err(e) => warn!("{id}: ignoring malformed snapshot: {e}"),
                    }
                }
                StreamClient::END => return Some(EndReason::Ended),
                other => trace!("{id}: ignoring event {other}"),
            }
        }
    }

    Some(EndReason::Closed)
}
