//! # cnc-host
//!
//! Executes a G-code file against a small stepper-driven machine: parses
//! and plans the program under the configured machine limits, synthesizes a
//! constant-tick step stream and drives it through the stepping engine,
//! with spindle and button handling on the side.
//!
//! Configuration is JSON, layered: built-in defaults, `defaults.json`,
//! `config.json`, then `POINTER=VALUE` command-line patches.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::error;

use cnc_host::config::Config;
use cnc_host::executive::Executive;
use cnc_host::machine;

/// Exit codes: 0 success, 1 missing or failing input, 2 usage error.
const EXIT_OK: i32 = 0;
const EXIT_INPUT: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// G-code runner for small stepper-driven CNC, plotter and laser machines.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// G-code file to execute.
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// JSON-pointer configuration overrides, e.g. /tick_duration_us=25
    #[arg(value_name = "POINTER=VALUE")]
    overrides: Vec<String>,

    /// G-code file to execute (alternate spelling).
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(short = 'C', long = "show-config")]
    show_config: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = Cli::parse();

    // with -f present, every positional argument is an override
    let (input, overrides) = match (&cli.file, &cli.input) {
        (Some(file), positional) => {
            let mut overrides = Vec::new();
            if let Some(p) = positional {
                overrides.push(p.display().to_string());
            }
            overrides.extend(cli.overrides.iter().cloned());
            (Some(file.clone()), overrides)
        }
        (None, positional) => (positional.clone(), cli.overrides.clone()),
    };

    let config = match Config::load_overlaid(
        &["defaults.json".as_ref(), "config.json".as_ref()],
        &overrides,
    ) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_USAGE;
        }
    };

    if cli.show_config {
        println!("{}", config.to_pretty_json());
        if input.is_none() {
            return EXIT_OK;
        }
    }

    let Some(input) = input else {
        let _ = Cli::command().print_help();
        return EXIT_USAGE;
    };

    let text = match std::fs::read_to_string(&input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("cannot read {}: {}", input.display(), e);
            return EXIT_INPUT;
        }
    };

    match execute(config, &text) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!("{:#}", e);
            EXIT_INPUT
        }
    }
}

fn execute(config: Config, text: &str) -> Result<()> {
    let (machine, _handles) = machine::assemble(&config);
    let executive = Executive::new(config, machine)?;
    executive.run_program(text)
}
