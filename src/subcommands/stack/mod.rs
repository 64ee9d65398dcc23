//! Subcommands that rewrite the stack.

mod rebase;
pub use rebase::RebaseCmd;

mod sync;
pub use sync::SyncCmd;
