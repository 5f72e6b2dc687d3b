//! HTTP API module.
//!
//! This module provides the HTTP server, the response mapper and the SSE
//! log stream for the isarest service.

pub mod logs;
pub mod server;
pub mod types;

pub use server::start_server;
pub use types::*;
