//! Run command implementation.

use super::{Format, Options};
use crate::error::CliResult;
use crate::member::Workbench;
use crate::scenarios::{Scenario, ScenarioReport};
use serde::Serialize;
use tracing::warn;
use unitwork_core::StatsSnapshot;

/// Everything one invocation of `run` produced.
#[derive(Debug, Serialize)]
pub struct RunOutput {
    /// One report per scenario, in replay order.
    pub reports: Vec<ScenarioReport>,
    /// Unit statistics after the last scenario (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
}

/// Replays the scenarios on one store, reseeding before each.
pub fn replay(bench: &Workbench, scenarios: &[Scenario]) -> CliResult<Vec<ScenarioReport>> {
    scenarios
        .iter()
        .map(|scenario| {
            let report = scenario.run(bench)?;
            if !report.passed() {
                warn!(
                    scenario = %scenario,
                    returned = report.returned_age,
                    expected = report.expected_age,
                    "unexpected age"
                );
            }
            Ok(report)
        })
        .collect()
}

/// Runs the run command.
pub fn run(options: &Options, scenarios: &[Scenario], show_stats: bool) -> CliResult<()> {
    let format = options.format()?;
    let bench = Workbench::open(options)?;

    let output = RunOutput {
        reports: replay(&bench, scenarios)?,
        stats: show_stats.then(|| bench.unit.stats()),
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        Format::Text => print_text_output(&output),
    }

    Ok(())
}

fn print_text_output(output: &RunOutput) {
    for report in &output.reports {
        let verdict = if report.passed() { "ok" } else { "UNEXPECTED" };
        println!("=== {} ===", report.scenario);
        println!(
            "Returned age:  {} (expected {}, {verdict})",
            report.returned_age, report.expected_age
        );
        match report.committed_age {
            Some(age) => println!("Committed age: {age}"),
            None => println!("Committed age: (deleted)"),
        }

        if !report.observations.is_empty() {
            println!("Observations:");
            for observation in &report.observations {
                println!("  {:<44} {}", observation.label, observation.value);
            }
        }

        println!("Statements:");
        for statement in &report.statements {
            println!("  {statement}");
        }
        println!();
    }

    if let Some(stats) = &output.stats {
        println!("=== Statistics ===");
        println!("Sessions opened:      {}", stats.sessions_opened);
        println!("Sessions committed:   {}", stats.sessions_committed);
        println!("Sessions rolled back: {}", stats.sessions_rolled_back);
        println!("Entities loaded:      {}", stats.entities_loaded);
        println!("Identity map hits:    {}", stats.identity_map_hits);
        println!("Queries:              {}", stats.queries);
        println!("Flushes:              {} ({} automatic)", stats.flushes, stats.auto_flushes);
        println!(
            "Writes:               {} ({} inserts, {} updates, {} deletes)",
            stats.writes(),
            stats.inserts,
            stats.updates,
            stats.deletes
        );
    }
}
