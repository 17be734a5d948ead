mod app;
mod cli;
mod simulate;

use app::App;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app = App::new(cli.config.as_deref())?;
    app.run(cli.command)?;

    Ok(())
}
