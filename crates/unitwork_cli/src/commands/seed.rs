//! Seed command implementation.

use super::{Format, Options};
use crate::error::CliResult;
use crate::member::Workbench;

/// Runs the seed command.
pub fn run(options: &Options) -> CliResult<()> {
    let format = options.format()?;
    let bench = Workbench::open(options)?;
    bench.reseed()?;

    let members = bench.members()?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&members)?),
        Format::Text => {
            let target = options
                .path
                .as_ref()
                .map_or_else(|| "memory".to_string(), |p| p.display().to_string());
            println!("Seeded {} members into {target}", members.len());
        }
    }

    Ok(())
}
