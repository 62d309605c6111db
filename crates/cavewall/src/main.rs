mod bindings;
mod cli;
mod run;
mod sim;
mod solve;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::run(cli)
}
