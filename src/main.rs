use anyhow::Result;
use anchorpatch::{
    cli::{self, Cli},
    infra::logging,
};
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; RUST_LOG overrides the flag-derived level
    logging::init(cli.verbose, cli.quiet, !cli.no_color);

    cli::run(cli)
}
