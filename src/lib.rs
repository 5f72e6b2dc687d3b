//! # isarest - ISA metadata conversion and validation service
//!
//! isarest exposes the ISA (Investigation/Study/Assay) tool chain over a
//! REST API: format conversion between ISA-Tab, ISA-JSON, SRA and CEDAR,
//! document validation, study imports from external repositories, and
//! study-design generation guarded by a combinatorial limits engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌────────────┐     ┌───────────────┐     ┌──────────┐
//! │  Upload  │────▶│ Dispatcher │────▶│ External tool │────▶│ Response │
//! │ (zip/json)│    │ (scoped FS)│     │ (convert/val) │     │ (doc/zip)│
//! └──────────┘     └────────────┘     └───────────────┘     └──────────┘
//! ```
//!
//! Every request runs inside a uniquely named working directory allocated
//! from the [`arena`]; the directory is removed on every exit path, so no
//! request leaves residue behind.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use isarest::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     api::start_server(Config::from_env()).await.unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Environment-driven configuration
//! - [`arena`] - Request-scoped working directories
//! - [`archive`] - Zip extraction, packing and entry-point location
//! - [`convert`] - Conversion table, pipeline and external tool bindings
//! - [`design`] - Study-design limits engine and generation flow
//! - [`import`] - External repository imports
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;

// Request-scoped storage
pub mod arena;

// Archive codec
pub mod archive;

// Conversion pipeline
pub mod convert;

// Study designs
pub mod design;

// External imports
pub mod import;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ArchiveError, ArenaError, ConvertError, ImportError, ServiceError, ServiceResult,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use archive::InputPayload;
pub use convert::dispatch::Dispatcher;
pub use convert::{Format, Outcome};

// =============================================================================
// Re-exports - Design engine
// =============================================================================

pub use design::{validate, StudyDesignConfig, ValidationLimits, ValidationReport};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
