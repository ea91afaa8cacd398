//! HTTP server

pub mod http;
pub mod response;

pub use http::{run, serve, AppState};
pub use response::BoxBody;
