//! Mnemo Host Library
//!
//! Command-line surface, engine accessor and source watcher around the
//! `mnemo-memory` crate.

pub mod cli;
pub mod error;
pub mod memory;
pub mod watcher;

pub use cli::{Cli, Command};
pub use error::{ServerError, ServerResult};
pub use memory::MemoryManager;
pub use watcher::SourceWatcher;
