//! Terminal rendering for scenario and filter reports

use crate::commands::simulate::StepReport;
use crate::manager::{CallbackRecord, EventReport, ProviderReport};
use colored::Colorize;
use tracemux_shared::utils::format_mask;

/// Final line of a successful command
pub fn done(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Report a failed command on stderr, with its whole context chain
pub fn failed(err: &anyhow::Error) {
    eprintln!("{} {:#}", "✗".red(), err);
}

pub fn notice(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print the state captured after one scenario step. `width` is the number
/// of session slots shown in each mask.
pub fn print_step(report: &StepReport, width: usize) {
    println!("{} {}", "▸".blue(), report.step.bold());

    if !report.sessions.is_empty() {
        let sessions = report
            .sessions
            .iter()
            .map(|(name, slot)| format!("{}@{}", name, slot))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  sessions: {}", sessions);
    }

    for cb in &report.callbacks {
        println!("  {}", callback_line(cb));
    }
    for provider in &report.providers {
        println!("  {}", provider_line(provider, width));
        for event in &provider.events {
            println!("    {}", event_line(event, width));
        }
    }
}

pub fn filter_pair(key: &str, value: &str) -> String {
    format!("  {:<24} {}", key.cyan(), value)
}

fn callback_line(cb: &CallbackRecord) -> String {
    let state = if cb.enabled {
        "enabled ".green()
    } else {
        "disabled".red()
    };
    let filter = cb
        .filter
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "callback {:<24} {} keywords={:#x} level={} {}",
        cb.provider, state, cb.keywords, cb.level, filter
    )
    .trim_end()
    .to_string()
}

fn provider_line(provider: &ProviderReport, width: usize) -> String {
    let status = &provider.status;
    let name = if status.enabled {
        status.name.bold()
    } else {
        status.name.dimmed()
    };
    format!(
        "{:<32} sessions={} keywords={:#x} level={}",
        name,
        format_mask(status.sessions, width),
        status.keywords,
        status.level
    )
}

fn event_line(event: &EventReport, width: usize) -> String {
    let mask = format_mask(event.enabled_mask, width);
    let mask = if event.enabled_mask != 0 {
        mask.green()
    } else {
        mask.normal()
    };
    format!(
        "event {:>5} keywords={:#06x} level={:<13} mask={}",
        event.id,
        event.keywords,
        event.level.to_string(),
        mask
    )
}
