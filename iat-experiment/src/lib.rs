pub mod config;
pub mod export;
pub mod generator;
pub mod response;
pub mod runner;
pub mod session;
pub use config::{CaptureKeys, ConfigError, ExperimentConfig, KeyBinding};
pub use export::{StandardExporter, TrialExporter, write_csv};
pub use generator::{GenerateError, GeneratedTrial, generate};
pub use response::{ResponseError, record_response};
pub use runner::{PlayerTrials, RoundStats, TrialRunner, TrialState};
pub use session::{SessionBuilder, SessionError, SessionSummary, build_all_trials, players_by_round};
