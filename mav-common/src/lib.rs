//! # MAV Common Library
//!
//! Shared code for the mobile asset viewer crates including:
//! - Error types
//! - Bootstrap configuration loading (TOML + environment)
//! - Event types (ViewerEvent enum) and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
