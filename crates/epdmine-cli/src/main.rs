use anyhow::Result;
use clap::Parser;

use epdmine_cli::cli::{Cli, Config};
use epdmine_cli::pipeline::{self, RunContext};

fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let cfg = Config::from_cli(Cli::parse())?;
    let jobs = pipeline::plan(&cfg)?;

    let ctx = RunContext::new(cfg)?;
    let summary = pipeline::run(&ctx, jobs)?;

    log::info!(
        "totals: {} file(s), {} game(s), {} reported position(s), {} unique position(s)",
        summary.files,
        summary.games,
        summary.reported,
        summary.unique_positions
    );
    Ok(())
}
