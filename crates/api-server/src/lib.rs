//! HTTP surface for the drip campaign engine: the periodic trigger entry
//! point, manual run/reset endpoints, and operational probes.

pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::ApiServer;
