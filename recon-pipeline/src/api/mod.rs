//! HTTP control API
//!
//! Runs are started with `POST /runs/*` and execute in the background;
//! progress arrives over `GET /events`.

pub mod health;
pub mod runs;
pub mod sse;

pub use health::health_routes;
pub use runs::{batch_routes, run_routes, stats_routes};
pub use sse::event_stream;
