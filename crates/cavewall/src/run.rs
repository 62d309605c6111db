use anyhow::Result;
use caveconfig::CaveConfig;
use tracing_subscriber::EnvFilter;

use crate::bindings;
use crate::cli::{Cli, Command};
use crate::sim;
use crate::solve;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let config = bindings::load_config(&cli)?;
    match &cli.command {
        Command::Solve(args) => solve::run(&config, args),
        Command::Simulate(args) => sim::run(&config, args),
        Command::Validate => validate(&config),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn validate(config: &CaveConfig) -> Result<()> {
    config.validate()?;
    println!("configuration OK: {} viewport(s)", config.viewports.len());
    for (name, viewport) in &config.viewports {
        println!(
            "  {name:<8} loc [{:+.3} {:+.3} {:+.3}]  size {:.3} x {:.3} m",
            viewport.loc[0],
            viewport.loc[1],
            viewport.loc[2],
            viewport.right - viewport.left,
            viewport.top - viewport.bottom,
        );
    }
    Ok(())
}
