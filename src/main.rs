mod cli;
mod collect;
mod config;
mod efd;
mod merge;
mod model;
mod render;
mod report;
mod window;

use std::process;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
