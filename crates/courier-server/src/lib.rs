//! Courier HTTP service
//!
//! Accepts email and long-running job submissions, hands them to the
//! `courier-jobs` engine and serves their progress at `/status/{id}`.

#[cfg(feature = "postgres")]
pub mod audit;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod response;
pub mod router;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::{Environment, Settings};
pub use error::ApiError;
pub use router::Router;
pub use server::Server;
pub use state::{AppState, StartupError};
