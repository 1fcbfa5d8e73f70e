// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Subhook API Library
//!
//! This crate contains the HTTP server components for subhook.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{Config, LogFormat};
pub use error::{ApiError, ApiResult};
pub use state::AppState;
