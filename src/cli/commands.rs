use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;

use crate::cli::config::SyncConfig;
use crate::cli::replay::{load_scenario, replay};
use crate::context::assembler::assemble;
use crate::trace::logger::TraceLogger;

// ============================================================================
// replay subcommand
// ============================================================================

/// Replay a scenario and print each sent envelope as one JSON line.
pub async fn cmd_replay(
    scenario_path: &str,
    trace_path: Option<&str>,
    config: &SyncConfig,
) -> anyhow::Result<()> {
    let scenario = load_scenario(scenario_path)?;
    let tracer = trace_path.map(TraceLogger::new);

    let outcome = replay(&scenario, config, tracer).await;

    for envelope in &outcome.sent {
        let line = serde_json::to_string(envelope).context("serializing sent context")?;
        println!("{}", line);
    }

    eprintln!(
        "{} context(s) sent, {} custom command(s) invoked, final uri {}",
        outcome.sent.len(),
        outcome.invoked.len(),
        outcome.final_uri
    );

    Ok(())
}

// ============================================================================
// survey subcommand
// ============================================================================

/// Print the context the scenario's initial document assembles to.
pub fn cmd_survey(scenario_path: &str) -> anyhow::Result<()> {
    let scenario = load_scenario(scenario_path)?;
    let invoked = Arc::new(Mutex::new(Vec::new()));
    let assembled = assemble(&scenario.document(), &scenario.custom_commands(&invoked), None);

    let json = serde_json::to_string_pretty(&assembled.context)
        .context("serializing assembled context")?;
    println!("{}", json);
    Ok(())
}
