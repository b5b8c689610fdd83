extern crate log;
extern crate pretty_env_logger;

use anyhow::Result;
use clap::Parser;
use dkg_registry::demo::run::{run, Cli};

fn main() -> Result<()> {
    pretty_env_logger::init();
    run(Cli::parse())
}
