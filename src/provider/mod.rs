// ABOUTME: Real-time air quality provider collaborator
// ABOUTME: Polls the measurement API and yields provider rows

pub mod client;
pub mod models;

pub use client::{parse_envelope, ProviderClient, ProviderPage};
