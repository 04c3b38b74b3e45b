//! # Waypoint Core
//!
//! The domain layer of the Waypoint API.
//! This crate contains the rate limiting rules with zero infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::ConfigError;
