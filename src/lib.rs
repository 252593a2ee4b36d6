// ABOUTME: Library root for station-sync
// ABOUTME: Field sync engine plus the provider, portal and configuration collaborators

pub mod collaborators;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod portal;
pub mod provider;
pub mod state;
pub mod utils;

pub use collaborators::{CommitResult, DestinationStore, ProviderSource, RecordOutcome};
pub use engine::{SyncEngine, SyncError};
