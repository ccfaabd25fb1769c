//! Shared configuration, error types and IDs for SSQ crates.
//!
//! Architecture role:
//! - defines planner configuration passed across layers
//! - provides common [`SsqError`] / [`Result`] contracts
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]

pub mod config;
pub mod error;
pub mod ids;

pub use config::PlannerConfig;
pub use error::{Result, SsqError};
pub use ids::*;
