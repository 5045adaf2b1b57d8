use anyhow::Result;
use butterfly_od::cli::{self, Cli};
use butterfly_od::logging;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format, &cli.log_level);
    cli::run(cli)
}
