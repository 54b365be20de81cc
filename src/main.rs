use anyhow::Result;
use clap::Parser;

use waymill::cli::Cli;

fn main() -> Result<()> {
    env_logger::init();
    Cli::parse().run()
}
