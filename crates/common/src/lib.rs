//! CardTest Common Library
//!
//! Fixture types, the driver error taxonomy, and the SQLite-backed site
//! backend that fixture drivers talk to.

pub mod crypto;
pub mod db;
pub mod error;
pub mod random;
pub mod site;
pub mod types;

// Re-export commonly used types
pub use db::Database;
pub use error::{DriverError, ErrorKind, Result, TeardownError, TeardownFailure};
pub use random::RandomNames;
pub use site::{Site, SiteSettings};
pub use types::*;

/// CardTest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
