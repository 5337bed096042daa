use std::env;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use cscs_debugger::cli::{Cli, Mode};
use cscs_debugger::config::ConnectionConfig;
use cscs_debugger::{dap, repl};

const LOG_ENV: &str = "CSCS_DEBUG_LOG";

fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("could not install logger: {}", e);
    }

    let cli = Cli::parse();
    let result = match cli.into_mode() {
        Mode::Repl(config) => {
            enable_trace(&config);
            repl::TerminalRepl::new(config).and_then(|mut terminal| terminal.run())
        }
        Mode::Webview(config) => {
            enable_trace(&config);
            repl::run_webview(config)
        }
        Mode::Dap => dap::run_dap_mode(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries protocol traffic in every mode but the
/// terminal REPL. Debug records from this crate stay filtered in but are only
/// emitted once tracing raises the global maximum.
fn init_logging() -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Warn)
        .filter_module("cscs_debugger", LevelFilter::Debug)
        .format_timestamp(None)
        .format_indent(Some(2))
        .parse_env(Env::new().filter(LOG_ENV));

    let logger = builder.build();
    let max_level = if env::var_os(LOG_ENV).is_some() {
        logger.filter()
    } else {
        LevelFilter::Warn
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}

fn enable_trace(config: &ConnectionConfig) {
    if config.trace && log::max_level() < LevelFilter::Debug {
        log::set_max_level(LevelFilter::Debug);
    }
}
