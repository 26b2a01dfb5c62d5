//! HTTP server for gatehouse

pub mod http;

pub use http::{run, AppState};
