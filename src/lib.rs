//! Coordination server for many clients cooperatively painting a shared
//! pixel canvas.
//!
//! An operator uploads a target image; [`orders`] turns it into a list of
//! palette placements, and the [`hub`] announces the new target to every
//! connected client over the WebSocket channel in [`server`].

pub mod app;
pub mod artifacts;
pub mod canvas;
pub mod client;
pub mod clock;
pub mod config;
pub mod http;
pub mod hub;
pub mod orders;
pub mod palette;
pub mod persist;
pub mod protocol;
pub mod server;
pub mod stats;
pub mod update;

pub use client::RemoteCanvas;
pub use config::Config;
pub use hub::Hub;
pub use tokio;
pub use url;
