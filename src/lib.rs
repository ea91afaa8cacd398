//! Browserver - serve files straight out of a browser tab
//!
//! A browser opens the admin page, picks a folder, and keeps one outbound
//! event stream open to the broker. Public callers request
//! `/{host_id}/{path}`; the broker pushes a `request_file` event down the
//! host's stream and answers the caller with whatever the tab uploads back,
//! or with an error once the request deadline passes.
//!
//! ## Components
//!
//! - **Hosts**: registry of online hosts and their outbound channels
//! - **Pending**: correlation table between public requests and host replies
//! - **Gateway**: public request handling
//! - **Channel**: SSE receive stream and the upload/error reply endpoints

pub mod channel;
pub mod config;
pub mod gateway;
pub mod hosts;
pub mod pending;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, serve, AppState};
pub use types::{BrowserverError, Result};
