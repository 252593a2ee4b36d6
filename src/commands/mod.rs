// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports sync, validate and status commands

pub mod status;
pub mod sync;
pub mod validate;

pub use status::StatusArgs;
pub use sync::SyncArgs;
pub use validate::ValidateArgs;
