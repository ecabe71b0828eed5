/* src/lib.rs */

// Re-export modules for both binary and tests
pub mod control;
pub mod error;
pub mod locate;
pub mod logger;
pub mod parse;
pub mod preflight;
pub mod runtime;
pub mod sink;
pub mod tail;

pub use error::{LaunchError, Result};
