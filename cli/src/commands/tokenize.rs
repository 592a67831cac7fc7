//! Tokenize command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracemux_shared::tokenize;

#[derive(Args, Debug)]
pub struct TokenizeArgs {
    /// Filter text, e.g. `a=1;b="x;y"`
    pub filter: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TokenizeReport {
    filter_type: u32,
    declared_len: usize,
    pairs: Vec<(String, String)>,
}

pub fn run(args: TokenizeArgs) -> Result<()> {
    let descriptor = tokenize(&args.filter).context("Failed to tokenize filter data")?;

    let Some(descriptor) = descriptor else {
        output::notice("Empty filter: no descriptor is passed to callbacks");
        return Ok(());
    };

    let report = TokenizeReport {
        filter_type: descriptor.filter_type(),
        declared_len: descriptor.len(),
        pairs: descriptor
            .pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (key, value) in &report.pairs {
        println!("{}", output::filter_pair(key, value));
    }
    output::done(&format!(
        "{} pairs, filter type {}, {} bytes declared",
        report.pairs.len(),
        report.filter_type,
        report.declared_len
    ));
    Ok(())
}
