pub mod config;
pub mod error;
pub mod types;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use types::*;
