//! Line-oriented terminal surface.
//!
//! Prints one line per change of a player's state:
//!
//! ```text
//! [org.mpris.MediaPlayer2.vlc] Blue in Green (volume 80%)
//! [org.mpris.MediaPlayer2.vlc] 1:05 / 5:37
//! ```
//!
//! Progress is printed when the displayed second changes, so a 60 Hz frame
//! rate does not flood the terminal. Artwork is fetched in the background
//! and only logged.

use std::io::{self, Write};

use tokio::task::JoinHandle;
use url::Url;

use crate::{
    api::Api,
    protocol::PlayerId,
    surface::{Fields, Mount, Surface, Timestamp},
};

/// Surface writing to `W`, standard output by default.
pub struct Terminal<W = io::Stdout> {
    id: PlayerId,
    api: Api,
    out: W,
    fields: Option<Fields>,
    shown_second: Option<i64>,
    artwork: Option<JoinHandle<()>>,
}

impl Terminal {
    #[must_use]
    pub fn new(api: Api, id: PlayerId) -> Self {
        Self::with_writer(api, id, io::stdout())
    }
}

impl<W: Write> Terminal<W> {
    #[must_use]
    pub fn with_writer(api: Api, id: PlayerId, out: W) -> Self {
        Self {
            id,
            api,
            out,
            fields: None,
            shown_second: None,
            artwork: None,
        }
    }

    fn print(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "[{}] {line}", self.id) {
            warn!("{}: cannot write to terminal: {e}", self.id);
        }
    }

    fn cancel_artwork(&mut self) {
        if let Some(task) = self.artwork.take() {
            task.abort();
        }
    }
}

impl<W: Write + Send> Surface for Terminal<W> {
    fn render(&mut self, fields: &Fields) {
        if self.fields.as_ref() == Some(fields) {
            return;
        }

        let mut line = if fields.title.is_empty() {
            "(untitled)".to_owned()
        } else {
            fields.title.clone()
        };
        if let Some(volume) = fields.volume_text() {
            line.push_str(&format!(" (volume {volume})"));
        }

        self.print(&line);
        // Reprint progress against the new length.
        self.shown_second = None;
        self.fields = Some(fields.clone());
    }

    fn render_position(&mut self, position: i64) {
        let second = position / 1_000_000;
        if self.shown_second == Some(second) {
            return;
        }
        self.shown_second = Some(second);

        let length = self.fields.as_ref().map_or(0, |fields| fields.length);
        let line = if length > 0 {
            format!("{} / {}", Timestamp(position), Timestamp(length))
        } else {
            Timestamp(position).to_string()
        };
        self.print(&line);
    }

    fn render_artwork(&mut self, url: Option<&Url>) {
        self.cancel_artwork();

        let Some(url) = url else {
            info!("{}: no artwork", self.id);
            return;
        };

        let api = self.api.clone();
        let id = self.id.clone();
        let url = url.clone();
        self.artwork = Some(tokio::spawn(async move {
            let http = api.http();
            let response = match http.fetch(http.get(url)).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("{id}: cannot fetch artwork: {e}");
                    return;
                }
            };

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("unknown type")
                .to_owned();
            match response.bytes().await {
                Ok(bytes) => info!("{id}: artwork of {} bytes ({content_type})", bytes.len()),
                Err(e) => warn!("{id}: cannot fetch artwork: {e}"),
            }
        }));
    }

    fn detach(&mut self) {
        self.cancel_artwork();
        self.print("gone");
        info!("{}: detached", self.id);
    }
}

/// Mounts a [`Terminal`] on standard output for every player.
#[derive(Clone, Debug)]
pub struct TerminalMount {
    api: Api,
}

impl TerminalMount {
    #[must_use]
    pub fn new(api: Api) -> Self {
        Self { api }
    }
}

impl Mount for TerminalMount {
    fn mount(&mut self, id: &PlayerId) -> Box<dyn Surface> {
        Box::new(Terminal::new(self.api.clone(), id.clone()))
    }
}
