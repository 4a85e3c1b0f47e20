//! terrasql - a restricted PostGIS-flavored SQL dialect over remote
//! geospatial collections
//!
//! Takes a query pre-parsed to a JSON AST by an external conversion
//! service and produces an equivalent call plan against a remote service
//! exposing raster images, image stacks, and vector feature tables. The
//! crate plans and orchestrates; the backend (reached through the
//! `backend::GeoBackend` trait) stores and computes.

pub mod ast;
pub mod backend;
pub mod engine;
pub mod error;
pub mod exec;
pub mod metadata;
pub mod plan;

pub use engine::QueryEngine;
pub use error::{EngineError, EngineResult};
