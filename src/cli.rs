use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iat", version, about = "Implicit Association Test trial generation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Experiment config (JSON, or YAML by extension). Built-in IAT when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the config and dry-run trial generation for every block
    Validate {
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List the rounds with their side headings
    Blocks,

    /// Print the built-in config
    InitConfig {
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Build a session, play it with simulated participants and export CSV
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    #[arg(short, long, default_value_t = 2)]
    pub participants: u64,

    #[arg(long, default_value = "sim")]
    pub session: String,

    /// Seed for both trial shuffling and simulated answers
    #[arg(long)]
    pub seed: Option<u64>,

    /// Share of trials answered with the wrong key, between 0 and 1
    #[arg(long, default_value_t = 0.1, value_parser = parse_rate)]
    pub error_rate: f64,

    /// Mean simulated reaction time
    #[arg(long, default_value_t = 650)]
    pub mean_rt_ms: u64,

    /// CSV destination; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Wait out reaction times and inter-trial delays on the system clock
    #[arg(long)]
    pub real_time: bool,
}

fn parse_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        return Err(format!("{s} is not a rate between 0 and 1"));
    }
    Ok(rate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}
