// ABOUTME: Destination portal collaborator
// ABOUTME: Session/token handling plus the feature layer snapshot and commit

pub mod client;
pub mod models;

pub use client::{FeatureLayer, PortalSession};
