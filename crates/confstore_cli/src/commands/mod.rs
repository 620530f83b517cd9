//! CLI command implementations.

pub mod apply;
pub mod dump;
pub mod read;
pub mod reset;
pub mod watch;
pub mod writable;
pub mod write;
