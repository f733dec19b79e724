//! # Argus Common
//!
//! Shared types, errors, and constants used across Argus components.
//!
//! ## Modules
//! - `types` - Challenge kinds, lifecycle phases, session snapshots
//! - `error` - Common error types
//! - `constants` - Timing windows, thresholds, and defaults

pub mod constants;
pub mod error;
pub mod types;

pub use error::ArgusError;
pub use types::*;
