// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Garnet - a Ruby interpreter written in Rust
//!
//! This is the main entry point for the garnet CLI/REPL.
//!
//! ## Features
//!
//! - Run a script file or a `-e` one-liner
//! - Interactive REPL with syntax highlighting and history
//! - Ruby-style reports for uncaught exceptions

mod repl;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use garnet_core::builtins::exception::format_report;
use garnet_core::{Engine, EngineConfig, Error};
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "GARNET_LOG";

#[derive(Debug, Parser)]
#[command(name = "garnet", version, about = "A Ruby interpreter written in Rust")]
struct Cli {
    /// Ruby file to execute
    file: Option<PathBuf>,

    /// Evaluate CODE instead of reading a file
    #[arg(short, long = "eval", value_name = "CODE")]
    eval: Option<String>,

    /// Add DIR to $LOAD_PATH (repeatable)
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Print the full backtrace of an uncaught exception
    #[arg(long)]
    backtrace: bool,

    /// Log interpreter activity to stderr
    #[arg(long)]
    verbose: bool,

    /// Enter the REPL after running FILE or CODE
    #[arg(short, long)]
    interactive: bool,
}

impl Cli {
    fn config(&self) -> EngineConfig {
        let program_name = match &self.file {
            Some(path) => path.display().to_string(),
            None => "-e".to_string(),
        };
        EngineConfig {
            program_name,
            load_paths: self.include.clone(),
            backtrace: self.backtrace,
            ..EngineConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut engine = Engine::with_config(cli.config());
    let result = match (&cli.eval, &cli.file) {
        (Some(code), _) => engine.eval(code),
        (None, Some(path)) => engine.eval_file(path),
        // No arguments - start REPL
        (None, None) => return run_repl(engine),
    };
    let flushed = engine.flush();

    if let Err(error) = result.and(flushed) {
        report(&error, cli.backtrace);
        return ExitCode::FAILURE;
    }

    if cli.interactive {
        return run_repl(engine);
    }
    ExitCode::SUCCESS
}

/// Logs go to stderr so they never mix with program output.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "warn" };
        EnvFilter::new(format!("garnet={level},garnet_core={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Start the interactive REPL
fn run_repl(engine: Engine) -> ExitCode {
    match repl::Repl::new(engine) {
        Ok(mut repl) => {
            if let Err(e) = repl.run() {
                eprintln!("{}: {:?}", "REPL Error".red().bold(), e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(
                "{}: Failed to initialize REPL: {:?}",
                "Error".red().bold(),
                e
            );
            ExitCode::FAILURE
        }
    }
}

/// Print an error the way `ruby` does: the origin, message and class,
/// then the remaining frames when a full backtrace was asked for.
fn report(error: &Error, full_backtrace: bool) {
    match error {
        Error::Raised {
            exception,
            backtrace,
        } => {
            debug!(class = %exception.class_name, "uncaught exception");
            let shown = if full_backtrace {
                &backtrace[..]
            } else {
                &backtrace[..backtrace.len().min(1)]
            };
            let text = format_report(&exception.class_name, &exception.message, shown);
            eprintln!("{}", text.red());
        }
        Error::Syntax { .. } => {
            eprintln!("{}: {}", "SyntaxError".red().bold(), error);
        }
        Error::Io(_) => {
            eprintln!("{}: {}", "Error".red().bold(), error);
        }
    }
}
