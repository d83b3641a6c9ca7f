//! Dump command implementation.

use super::{Format, Options};
use crate::error::CliResult;
use crate::member::{Member, Workbench};

/// Runs the dump command.
pub fn run(options: &Options) -> CliResult<()> {
    let format = options.format()?;
    let bench = Workbench::open(options)?;
    let members = bench.members()?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&members)?),
        Format::Text => print_text_output(&members),
    }

    Ok(())
}

fn print_text_output(members: &[Member]) {
    if members.is_empty() {
        println!("No members stored.");
        return;
    }

    println!("{:>4}  {:<12} {:>3}", "ID", "NAME", "AGE");
    for member in members {
        println!("{member}");
    }
    println!("\n{} members", members.len());
}
