// ABOUTME: validate command - checks station/field lists and connection settings offline
// ABOUTME: Fails with a configuration error before any remote call would be made

use anyhow::Result;
use clap::Args;

use crate::config::{ConnectionArgs, EngineArgs};

#[derive(Args, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub engine: EngineArgs,
}

pub async fn command(args: ValidateArgs) -> Result<()> {
    let (registry, whitelist, join_key) = args.engine.load()?;
    let settings = args.connection.resolve()?;

    println!("Configuration is valid");
    println!("  Stations:      {} ({})", registry.len(), args.engine.stations.display());
    println!("  Fields:        {}", whitelist.iter().collect::<Vec<_>>().join(", "));
    println!(
        "  Join key:      destination '{}' / provider '{}'",
        join_key.destination_field, join_key.provider_field
    );
    println!("  Provider URL:  {}", settings.provider.base_url);
    println!("  Portal:        {}", settings.portal.portal_url);
    match settings.portal.layer_url {
        Some(ref url) => println!("  Layer:         {}", url),
        None => println!(
            "  Layer:         '{}' owned by {}",
            settings.portal.layer_title, settings.portal.username
        ),
    }

    if whitelist.contains(&join_key.provider_field) {
        tracing::warn!(
            "Join field '{}' is whitelisted; station names will be overwritten by provider values",
            join_key.provider_field
        );
    }

    Ok(())
}
