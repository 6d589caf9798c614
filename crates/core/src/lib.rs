//! Shared domain types, configuration, and collaborator seams for the
//! DripFlow campaign execution engine.

pub mod campaign;
pub mod config;
pub mod dispatch;
pub mod error;

pub use error::{DripError, DripResult};
