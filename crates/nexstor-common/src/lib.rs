//! nexstor common - shared types for the appliance management client
//!
//! Resource records, validated resource paths, appliance error codes and
//! client configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{ApplianceError, ErrorCode};
pub use types::*;
