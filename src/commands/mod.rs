//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod jobs;
pub mod purge;

pub use purge::PurgeArgs;
