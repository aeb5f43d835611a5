//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Timestamps are wall-clock `DateTime<Utc>`; durations are derived in milliseconds
//! - Any timestamp may be absent

mod collaborator;
mod config;
mod error;
mod outcome;
mod sink;

pub use collaborator::*;
pub use config::*;
pub use error::*;
pub use outcome::*;
pub use sink::*;
