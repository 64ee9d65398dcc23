//! Subcommands pertaining to review branches and pull requests.

mod export;
pub use export::ExportCmd;
