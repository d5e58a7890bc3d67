//! Orbit TX - application layer
//! Configuration and reference strategies on top of `orbit_core`

pub mod config;
pub mod strategies;

pub use config::AppConfig;
