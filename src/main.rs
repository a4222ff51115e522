//! dsnpool command-line entry point.
//!
//! ## Subcommands
//!
//! - `dsnpool config show|defaults|validate` - Inspect configuration
//! - `dsnpool demo [--json]` - Run the pool against the in-memory driver
//! - `dsnpool help`, `dsnpool version`

use std::path::Path;
use std::process::ExitCode;

use dsnpool::cli::{self, config_cmd};
use dsnpool::config;
use dsnpool::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let file = cli::flag_value(&args, "--file").map(Path::new);

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let code = config_cmd::run_show(file, cli::has_flag(&args, "--json"));
                    ExitCode::from(code as u8)
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => {
                    let code = config_cmd::run_validate(file);
                    ExitCode::from(code as u8)
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "demo" => {
            let log = match file {
                Some(path) => match config::load_file(path) {
                    Ok(cfg) => cfg.log,
                    Err(e) => {
                        eprintln!("ERROR: {}", e);
                        return ExitCode::from(cli::EXIT_CONFIG as u8);
                    }
                },
                None => config::load().log,
            };
            start_logging(&log);
            let code = cli::run_demo(cli::has_flag(&args, "--json")).await;
            ExitCode::from(code as u8)
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("dsnpool {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn start_logging(config: &LogConfig) {
    if let Err(e) = init_logging(config) {
        eprintln!("Logging disabled: {}", e);
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "dsnpool - descriptor-keyed connection pool v{}

USAGE:
    dsnpool <COMMAND> [OPTIONS]

COMMANDS:
    config       Inspect configuration (show, defaults, validate)
    demo         Run a pool through acquire, reuse and eviction
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information
    --file PATH    Load configuration from a TOML file

ENVIRONMENT:
    DSNPOOL_MAX_SIZE            Tracked connection capacity (default: 10)
    DSNPOOL_IDLE_TIMEOUT        Default idle timeout in seconds (default: 30)
    DSNPOOL_EXHAUSTION          overflow, block or fail (default: overflow)
    DSNPOOL_ACQUIRE_TIMEOUT_MS  Wait limit under block, 0 for none (default: 0)
    DSNPOOL_LOG_LEVEL           Log filter (default: info)
    DSNPOOL_LOG_FORMAT          json or pretty (default: json)

EXIT CODES:
    0  Success
    1  Failure or validation warnings
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "config" => {
            eprintln!(
                "dsnpool config - Inspect configuration

USAGE:
    dsnpool config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show           Show effective configuration
    defaults       Show default configuration
    validate       Check for contradictory settings

OPTIONS:
    --file PATH    TOML file applied before environment variables
    --json         Output in JSON format (show only)

EXAMPLES:
    dsnpool config show
    dsnpool config show --json
    dsnpool config validate --file pool.toml
"
            );
        }
        "demo" => {
            eprintln!(
                "dsnpool demo - Run the pool against an in-memory driver

USAGE:
    dsnpool demo [OPTIONS]

OPTIONS:
    --json         Output snapshots as JSON
    --file PATH    Read [log] settings from a TOML file

DESCRIPTION:
    Opens two connections in a two-slot pool, releases and reacquires one,
    opens an overflow connection, then waits for the idle timeout and shuts
    the pool down. A snapshot is printed after each step.
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'dsnpool help' for general usage.",
                command
            );
        }
    }
}
