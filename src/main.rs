//! `sn` entry point.

fn main() {
    std::process::exit(sindarin_core::cli::run_cli());
}
