pub mod constants;
pub mod history;
pub mod logging;
pub mod main_helper;
pub mod reconcile;
pub mod relay;
pub mod routes;
pub mod session;
pub mod sse;
pub mod types;
pub mod upstream;
pub mod vote;

pub use types::*;

pub use main_helper::{AppState, Args};
