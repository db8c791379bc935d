use std::process::exit;

use colored::Colorize;

fn main() {
    if let Err(e) = fuzzbuster::app::run_cli() {
        eprintln!("{}{} {}", "error".red().bold(), ":".dimmed(), e.bold());
        exit(1);
    }
}
