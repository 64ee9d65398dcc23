//! Subcommands that only read or write the local repository.

mod config;
pub use config::ConfigCmd;

mod log;
pub use log::LogCmd;

mod new;
pub use new::NewCmd;
