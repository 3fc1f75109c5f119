//! Live status client for remote media players.
//!
//! A media-control backend enumerates the players it knows and pushes a
//! complete [`Snapshot`](protocol::Snapshot) of each player over
//! Server-Sent Events whenever its state changes. This crate keeps one
//! presentation [`Surface`](surface::Surface) per player in sync with those
//! snapshots, and extrapolates the playback position locally so that
//! progress advances smoothly between them.
//!
//! # Structure
//!
//! * [`registry`] - Enumerates players once and owns one controller each
//! * [`controller`] - Binds a player's stream to its surface
//! * [`stream`] - Push-channel subscription of a single player
//! * [`extrapolator`] - Position prediction between snapshots
//! * [`commands`] - Fire-and-forget playback commands
//! * [`surface`] / [`terminal`] - Where player state is shown
//!
//! # Example
//!
//! ```rust
//! use playerbar::{api::Api, config::Config, registry::Registry, terminal::TerminalMount};
//!
//! let config = Config::default();
//! let mut mount = TerminalMount::new(Api::new(&config)?);
//! let mut registry = Registry::bootstrap(&config, &mut mount).await?;
//! registry.run_until_empty().await;
//! ```
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod api;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod extrapolator;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod signal;
pub mod stream;
pub mod surface;
pub mod terminal;
