//! sitevault CLI entry point
//!
//! Parses arguments, runs one command and exits with its code. All logic is
//! delegated to the CLI module.

use sitevault::cli;

fn main() {
    std::process::exit(cli::run());
}
