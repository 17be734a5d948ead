use crate::cli::{Command, Format, SimulateArgs};
use crate::simulate::{SimulatedParticipant, play_session};
use anyhow::{Context, Result, bail};
use iat_core::{Participant, Side};
use iat_experiment::{ExperimentConfig, SessionBuilder, StandardExporter, generate, write_csv};
use iat_store::MemoryStore;
use iat_timing::{HighPrecisionTimer, ManualTimer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{error, info};

pub struct App {
    config: ExperimentConfig,
}

impl App {
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => ExperimentConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        Ok(Self { config })
    }

    pub fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Validate { seed } => self.validate(seed),
            Command::Blocks => self.blocks(&mut io::stdout().lock()),
            Command::InitConfig { format } => self.init_config(format, &mut io::stdout().lock()),
            Command::Simulate(args) => self.simulate(args),
        }
    }

    fn validate(&self, seed: Option<u64>) -> Result<()> {
        self.config.validate()?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut failures = 0;
        for (round, block) in self.config.rounds() {
            match generate(block, &self.config.stimuli, &mut rng) {
                Ok(trials) => info!(round, block = %block.label, trials = trials.len(), "Block ok"),
                Err(e) => {
                    error!(round, "{e}");
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            bail!("{failures} block(s) failed to generate");
        }
        info!(rounds = self.config.num_rounds(), "Configuration is consistent");
        Ok(())
    }

    fn blocks(&self, out: &mut impl Write) -> Result<()> {
        for (round, block) in self.config.rounds() {
            let kind = if block.kind().is_practice() { "practice" } else { "test" };
            writeln!(
                out,
                "{round}. {} [{kind}, n={}]  {} | {}",
                block.label,
                block.n,
                self.config.side_heading(block, Side::Left),
                self.config.side_heading(block, Side::Right),
            )?;
            if let Some(notice) = &block.notice {
                writeln!(out, "   notice: {notice}")?;
            }
        }
        Ok(())
    }

    fn init_config(&self, format: Format, out: &mut impl Write) -> Result<()> {
        let text = match format {
            Format::Json => serde_json::to_string_pretty(&self.config)?,
            Format::Yaml => serde_yaml::to_string(&self.config)?,
        };
        writeln!(out, "{text}")?;
        Ok(())
    }

    fn simulate(&self, args: SimulateArgs) -> Result<()> {
        let participants: Vec<_> = (1..=args.participants)
            .map(|i| Participant::new(i, format!("{}-{i:03}", args.session), args.session.as_str()))
            .collect();
        let store = MemoryStore::new();

        let summary = SessionBuilder::new(&self.config, args.seed)
            .build(&store, &args.session, &participants)
            .context("building session")?;

        let answers_rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_os_rng(),
        };
        let mut responder =
            SimulatedParticipant::new(answers_rng, args.error_rate, args.mean_rt_ms);
        let totals = if args.real_time {
            let timer = HighPrecisionTimer::new();
            play_session(&store, &self.config, &participants, &mut responder, timer)?
        } else {
            let timer = ManualTimer::new();
            play_session(&store, &self.config, &participants, &mut responder, timer)?
        };
        for (code, stats) in &totals {
            let mean_rt = stats.total_time_ms / stats.answered.max(1) as u64;
            info!(
                participant = %code,
                correct = stats.correct,
                answered = stats.answered,
                mean_rt,
                "Participant done"
            );
        }

        let exporter = StandardExporter::new(&store);
        let rows = match &args.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                write_csv(&exporter, BufWriter::new(file))?
            }
            None => write_csv(&exporter, io::stdout().lock())?,
        };
        info!(session = %summary.session_code, rows, "Export written");
        Ok(())
    }
}
