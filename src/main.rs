//! rally CLI entry point

use clap::Parser;

fn main() {
    rally::cli::run(rally::cli::Cli::parse());
}
