//! Registry against a fake media-control backend.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use playerbar::{
    config::Config,
    events::EndReason,
    protocol::PlayerId,
    registry::Registry,
    surface::{Fields, Surface},
};

type Feed = mpsc::Sender<Result<SseEvent, Infallible>>;

#[derive(Clone, Default)]
struct Backend {
    list: Vec<String>,
    feeds: Arc<Mutex<HashMap<String, mpsc::Receiver<Result<SseEvent, Infallible>>>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl Backend {
    fn new(list: &[&str]) -> Self {
        Self {
            list: list.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Makes player `id` subscribable and returns its event feed.
    fn feed(&self, id: &str) -> Feed {
        let (tx, rx) = mpsc::channel(16);
        self.feeds.lock().unwrap().insert(id.to_owned(), rx);
        tx
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

async fn list(State(backend): State<Backend>) -> Json<Vec<String>> {
    Json(backend.list)
}

async fn metadata(State(backend): State<Backend>, Path(id): Path<String>) -> Response {
    let feed = backend.feeds.lock().unwrap().remove(&id);
    match feed {
        Some(rx) => Sse::new(ReceiverStream::new(rx)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn command(State(backend): State<Backend>, uri: Uri) -> StatusCode {
    backend.commands.lock().unwrap().push(uri.path().to_owned());
    StatusCode::OK
}

async fn serve(backend: Backend) -> Config {
    let app = Router::new()
        .route("/api/list", get(list))
        .route("/api/metadata/{id}", get(metadata))
        .route("/api/playpause/{id}", post(command))
        .route("/api/next/{id}", post(command))
        .route("/api/prev/{id}", post(command))
        .route("/api/seek/{id}/{delta}", post(command))
        .route("/api/volume/{id}/{volume}", post(command))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let mut config = Config::default();
    config.set_base_url(&format!("http://{addr}/")).unwrap();
    config
}

fn update(title: &str, position: i64, running: bool) -> Result<SseEvent, Infallible> {
    let snapshot = json!({
        "title": title,
        "position": position,
        "length": 300_000_000,
        "running": running,
        "playback_rate": 1.0,
        "can_go_next": true,
        "art_url_hash": null,
    });
    Ok(SseEvent::default().event("update").data(snapshot.to_string()))
}

fn end() -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default().event("end").data(""))
}

#[derive(Clone, Debug, PartialEq)]
enum Call {
    Render(String),
    Position(i64),
    Artwork(Option<Url>),
    Detach,
}

type Calls = Arc<Mutex<Vec<(String, Call)>>>;

struct Recorder {
    id: String,
    calls: Calls,
}

impl Recorder {
    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push((self.id.clone(), call));
    }
}

impl Surface for Recorder {
    fn render(&mut self, fields: &Fields) {
        self.push(Call::Render(fields.title.clone()));
    }

    fn render_position(&mut self, position: i64) {
        self.push(Call::Position(position));
    }

    fn render_artwork(&mut self, url: Option<&Url>) {
        self.push(Call::Artwork(url.cloned()));
    }

    fn detach(&mut self) {
        self.push(Call::Detach);
    }
}

fn recorder() -> (Calls, impl FnMut(&PlayerId) -> Box<dyn Surface>) {
    let calls = Calls::default();
    let mount = {
        let calls = Arc::clone(&calls);
        move |id: &PlayerId| -> Box<dyn Surface> {
            Box::new(Recorder {
                id: id.to_string(),
                calls: Arc::clone(&calls),
            })
        }
    };
    (calls, mount)
}

fn calls_of(calls: &Calls, id: &str) -> Vec<Call> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|(of, _)| of == id)
        .map(|(_, call)| call.clone())
        .collect()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn ids(registry: &Registry) -> Vec<String> {
    registry.ids().map(ToString::to_string).collect()
}

#[tokio::test]
async fn players_are_independent() {
    let backend = Backend::new(&["a", "b"]);
    let feed_a = backend.feed("a");
    let feed_b = backend.feed("b");
    let config = serve(backend).await;

    let (calls, mut mount) = recorder();
    let mut registry = Registry::bootstrap(&config, &mut mount).await.unwrap();
    assert_eq!(ids(&registry), ["a", "b"]);

    feed_a.send(update("Kind of Blue", 3_000_000, false)).await.unwrap();
    feed_b.send(update("Sketches of Spain", 0, false)).await.unwrap();
    eventually(|| {
        calls_of(&calls, "a").contains(&Call::Position(3_000_000))
            && calls_of(&calls, "b").contains(&Call::Position(0))
    })
    .await;
    assert_eq!(
        calls_of(&calls, "a")[0],
        Call::Render("Kind of Blue".to_owned())
    );

    feed_a.send(end()).await.unwrap();
    let (id, reason) = registry.next_ended().await.unwrap();
    assert_eq!(id.as_str(), "a");
    assert_eq!(reason, EndReason::Ended);
    assert_eq!(ids(&registry), ["b"]);
    assert_eq!(calls_of(&calls, "a").last(), Some(&Call::Detach));
    assert!(!calls_of(&calls, "b").contains(&Call::Detach));

    // The other player keeps going.
    feed_b.send(update("Saeta", 7_000_000, false)).await.unwrap();
    eventually(|| calls_of(&calls, "b").contains(&Call::Render("Saeta".to_owned()))).await;

    registry.shutdown().await;
    assert!(registry.is_empty());
    let detaches = |id| {
        calls_of(&calls, id)
            .iter()
            .filter(|call| **call == Call::Detach)
            .count()
    };
    assert_eq!(detaches("a"), 1);
    assert_eq!(detaches("b"), 1);
}

#[tokio::test]
async fn playing_position_advances_between_snapshots() {
    let backend = Backend::new(&["a"]);
    let feed = backend.feed("a");
    let config = serve(backend).await;

    let (calls, mut mount) = recorder();
    let mut registry = Registry::bootstrap(&config, &mut mount).await.unwrap();

    feed.send(update("So What", 1_000_000, true)).await.unwrap();
    eventually(|| {
        calls_of(&calls, "a")
            .iter()
            .any(|call| matches!(call, Call::Position(position) if *position >= 1_100_000))
    })
    .await;

    registry.shutdown().await;
}

#[tokio::test]
async fn duplicates_and_missing_players() {
    let backend = Backend::new(&["a", "a", "ghost"]);
    let _feed = backend.feed("a");
    let config = serve(backend).await;

    let (calls, mut mount) = recorder();
    let mut registry = Registry::bootstrap(&config, &mut mount).await.unwrap();
    assert_eq!(ids(&registry), ["a", "ghost"]);

    let (id, reason) = registry.next_ended().await.unwrap();
    assert_eq!(id.as_str(), "ghost");
    assert_eq!(reason, EndReason::Refused(404));
    assert_eq!(calls_of(&calls, "ghost"), [Call::Detach]);

    assert!(registry.detach(&"a".parse().unwrap()).await);
    assert!(registry.is_empty());
    assert_eq!(registry.next_ended().await, None);
}

#[tokio::test]
async fn malformed_snapshots_are_skipped() {
    let backend = Backend::new(&["a"]);
    let feed = backend.feed("a");
    let config = serve(backend).await;

    let (calls, mut mount) = recorder();
    let mut registry = Registry::bootstrap(&config, &mut mount).await.unwrap();

    feed.send(Ok(SseEvent::default().event("update").data("{not json")))
        .await
        .unwrap();
    feed.send(Ok(SseEvent::default().data("unnamed")))
        .await
        .unwrap();
    feed.send(update("All Blues", 0, false)).await.unwrap();
    feed.send(end()).await.unwrap();

    registry.run_until_empty().await;
    assert_eq!(
        calls_of(&calls, "a"),
        [
            Call::Render("All Blues".to_owned()),
            Call::Position(0),
            Call::Detach
        ]
    );
}

#[tokio::test]
async fn commands_reach_the_backend() {
    let backend = Backend::new(&["odd/id"]);
    let _feed = backend.feed("odd/id");
    let config = serve(backend.clone()).await;

    let (_calls, mut mount) = recorder();
    let mut registry = Registry::bootstrap(&config, &mut mount).await.unwrap();

    let commands = registry.commands(&"odd/id".parse().unwrap()).unwrap();
    commands.seek(-5_000_000).await.unwrap();
    commands.set_volume(1.5).await.unwrap();
    commands.play_pause().await.unwrap();
    commands.previous().await.unwrap();

    assert_eq!(
        backend.commands(),
        [
            "/api/seek/odd%2Fid/-5000000",
            "/api/volume/odd%2Fid/1",
            "/api/playpause/odd%2Fid",
            "/api/prev/odd%2Fid",
        ]
    );

    registry.shutdown().await;
}

/// Surface of a host that cannot cope with a title.
struct Faulty;

impl Surface for Faulty {
    fn render(&mut self, _: &Fields) {
        panic!("cannot render");
    }

    fn render_position(&mut self, _: i64) {}

    fn render_artwork(&mut self, _: Option<&Url>) {}

    fn detach(&mut self) {}
}

#[tokio::test]
async fn panicking_controller_does_not_block_others() {
    let backend = Backend::new(&["a", "b"]);
    let feed_a = backend.feed("a");
    let feed_b = backend.feed("b");
    let config = serve(backend).await;

    let (calls, mut record) = recorder();
    let mut mount = move |id: &PlayerId| -> Box<dyn Surface> {
        if id.as_str() == "a" {
            Box::new(Faulty)
        } else {
            record(id)
        }
    };
    let mut registry = Registry::bootstrap(&config, &mut mount).await.unwrap();

    feed_a.send(update("Kind of Blue", 0, false)).await.unwrap();
    feed_b.send(end()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), registry.run_until_empty())
        .await
        .expect("registry kept a dead player");
    assert!(registry.is_empty());
    assert_eq!(calls_of(&calls, "b").last(), Some(&Call::Detach));
}

#[tokio::test]
async fn panicking_controller_is_reported_as_failed() {
    let backend = Backend::new(&["a"]);
    let feed = backend.feed("a");
    let config = serve(backend).await;

    let mut mount = |_: &PlayerId| -> Box<dyn Surface> { Box::new(Faulty) };
    let mut registry = Registry::bootstrap(&config, &mut mount).await.unwrap();

    feed.send(update("Kind of Blue", 0, false)).await.unwrap();

    let (id, reason) = tokio::time::timeout(Duration::from_secs(5), registry.next_ended())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(id.as_str(), "a");
    assert!(matches!(reason, EndReason::Failed(_)));
    assert!(registry.is_empty());
}
