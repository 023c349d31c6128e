mod cli;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    cli::run(cli::Args::parse())
}
