//! Shared helpers used by every other crate in the workspace: hashing
//! primitives, the logging setup, and small utility types that don't
//! belong to any single consensus component.

#[macro_use]
extern crate lazy_static;

pub mod hash;
pub mod logger;
pub mod rate_counter;

pub use parking_lot::{Mutex, RwLock};

pub use logger::{init_logger, LogLevel};
