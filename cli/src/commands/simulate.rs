//! Simulate command implementation

use crate::manager::{CallbackRecord, ProviderReport, SessionManager};
use crate::output;
use crate::scenario::{EventSpec, Scenario, Step};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tracemux_engine::metrics::encode_metrics;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario file (TOML)
    pub scenario: PathBuf,

    /// Print the step reports as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Print engine metrics after the run
    #[arg(long)]
    pub metrics: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// State after one scenario step
#[derive(Debug, Serialize)]
pub struct StepReport {
    pub step: String,
    pub sessions: Vec<(String, usize)>,
    pub callbacks: Vec<CallbackRecord>,
    pub providers: Vec<ProviderReport>,
}

pub fn run(args: SimulateArgs) -> Result<()> {
    let scenario = Scenario::from_file(&args.scenario)?;
    let reports = simulate(&scenario)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        let width = scenario.engine.max_sessions;
        for report in &reports {
            output::print_step(report, width);
        }
        output::done(&format!(
            "Ran {} steps from {}",
            scenario.steps.len(),
            args.scenario.display()
        ));
    }

    if args.metrics {
        print!("{}", encode_metrics().context("Failed to encode metrics")?);
    }

    Ok(())
}

/// Run every step of `scenario`, reporting the state after setup and after
/// each step
pub fn simulate(scenario: &Scenario) -> Result<Vec<StepReport>> {
    let mut manager = SessionManager::new(scenario.engine.clone())?;
    let mut reports = Vec::with_capacity(scenario.steps.len() + 1);

    for provider in &scenario.providers {
        manager.register_provider(provider)?;
    }
    reports.push(snapshot(&manager, "setup".to_string())?);

    for (i, step) in scenario.steps.iter().enumerate() {
        apply(&mut manager, scenario, step)
            .with_context(|| format!("Step {} ({}) failed", i + 1, step.describe()))?;
        reports.push(snapshot(&manager, step.describe())?);
    }

    Ok(reports)
}

fn apply(manager: &mut SessionManager, scenario: &Scenario, step: &Step) -> Result<()> {
    match step {
        Step::Attach { session } => {
            let spec = scenario
                .session(session)
                .with_context(|| format!("Unknown session '{}'", session))?;
            manager.start_session(spec)?;
        }
        Step::Detach { session } => manager.stop_session(session)?,
        Step::Retune {
            session,
            provider,
            keywords,
            level,
            filter,
        } => manager.retune(session, provider, *keywords, *level, filter.clone())?,
        Step::Register {
            provider,
            id,
            keywords,
            level,
            version,
            needs_stack,
        } => manager.register_event(
            provider,
            &EventSpec {
                id: *id,
                keywords: *keywords,
                level: *level,
                version: *version,
                needs_stack: *needs_stack,
            },
        )?,
    }
    Ok(())
}

fn snapshot(manager: &SessionManager, step: String) -> Result<StepReport> {
    Ok(StepReport {
        step,
        sessions: manager
            .session_slots()
            .into_iter()
            .map(|(name, slot)| (name, slot.get()))
            .collect(),
        callbacks: manager.take_callbacks(),
        providers: manager.report()?,
    })
}
