//! CLI command handlers, one per file.

mod fetch;
mod probe;
mod sources;

pub use fetch::run_fetch;
pub use probe::run_probe;
pub use sources::run_sources;
