// ABOUTME: status command - prints the summary of the last recorded sync cycle
// ABOUTME: Reads the state file written by the sync command

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::state::CycleSummary;

#[derive(Args, Clone)]
pub struct StatusArgs {
    /// State file to read (defaults to ~/.station-sync/last_cycle.json)
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

pub async fn command(args: StatusArgs) -> Result<()> {
    let path = args
        .state_file
        .unwrap_or_else(CycleSummary::default_path);
    let summary = CycleSummary::load(&path)
        .await
        .context("Failed to load last cycle summary")?;

    let Some(summary) = summary else {
        println!("No sync cycle has been recorded yet.");
        return Ok(());
    };

    let c = &summary.counts;
    println!(
        "Last cycle finished at {}{}",
        summary.finished_at.to_rfc3339(),
        if summary.dry_run { " (dry run)" } else { "" }
    );
    println!("  Duration:           {}ms", summary.duration_ms);
    println!("  Stations attempted: {}", c.attempted);
    println!("  Matched:            {}", c.matched);
    println!("  Updated:            {}", c.updated);
    println!("  Partially updated:  {}", c.partial);
    println!("  Unmatched:          {}", c.unmatched);
    println!("  Ambiguous:          {}", c.ambiguous);
    println!("  Excluded:           {}", c.excluded);
    match summary.committed {
        Some(committed) => {
            println!("  Committed:          {}", committed);
            println!("  Rejected:           {}", summary.rejected.len());
        }
        None => println!("  Committed:          nothing"),
    }

    for issue in &summary.issues {
        println!("  - {}", issue);
    }
    for rejected in &summary.rejected {
        println!("  ! {}", rejected);
    }

    Ok(())
}
