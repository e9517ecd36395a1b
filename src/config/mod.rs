//! Configuration
//!
//! Defaults, optionally overridden by a JSON file and then by command-line
//! flags.

mod schema;
mod store;

pub use schema::*;
pub use store::ConfigStore;
