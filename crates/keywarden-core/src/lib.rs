//! Keywarden Core - Shared functionality for the Keywarden tools
//!
//! Path resolution and small formatting helpers used by every crate in the
//! workspace.

pub mod format;
pub mod paths;

pub use format::format_size;
pub use paths::Paths;
