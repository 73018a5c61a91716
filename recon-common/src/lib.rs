//! # Recon Common Library
//!
//! Shared code for the reconciliation pipeline crates:
//! - Error taxonomy (`Error`, `Result`)
//! - TOML configuration schema, loading and root folder resolution
//! - Event types and the broadcast `EventBus`
//! - Identifier normalization
//! - Timestamp and batch tag helpers

pub mod config;
pub mod error;
pub mod events;
pub mod identifier;
pub mod time;

pub use error::{Error, Result};
pub use identifier::Identifier;
