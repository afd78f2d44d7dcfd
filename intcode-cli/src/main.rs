//! # Intcode CLI
//!
//! Command-line interface for the Intcode VM.
//!
//! Usage:
//!   intcode run <file>
//!   intcode run --code "3,0,4,0,99" --input 42
//!   intcode disasm <file>
//!   intcode serve --bind 127.0.0.1:7878 --state-dir .intcode_sessions
//!   intcode sessions --state-dir .intcode_sessions

mod server;

use clap::{Parser, Subcommand};
use intcode_vm::session::program_error_message;
use intcode_vm::{Error, ExecutionResult, FileStore, Machine, Program, StateStore};
use server::{ServeConfig, Server};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "intcode")]
#[command(author, version, about = "Intcode - a pausable Intcode virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only print program outputs and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program locally, printing one output per line
    Run {
        /// Path to a file holding comma-separated program text
        #[arg(required_unless_present = "code", conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Program text given inline
        #[arg(short, long)]
        code: Option<String>,

        /// Initial inputs, comma-separated
        #[arg(short, long, default_value = "", allow_hyphen_values = true)]
        input: String,

        /// Prompt on stdin whenever the program needs more input
        #[arg(long)]
        interactive: bool,
    },
    /// Print a program as decoded instructions
    Disasm {
        /// Path to a file holding comma-separated program text
        #[arg(required_unless_present = "code", conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Program text given inline
        #[arg(short, long)]
        code: Option<String>,
    },
    /// Serve sessions over TCP, one JSON message per line
    Serve {
        /// Address to listen on [default: 127.0.0.1:7878]
        #[arg(short, long, env = "INTCODE_BIND")]
        bind: Option<String>,

        /// Keep suspended sessions in this directory instead of memory
        #[arg(long, env = "INTCODE_STATE_DIR")]
        state_dir: Option<PathBuf>,
    },
    /// List sessions stored in a state directory
    Sessions {
        #[arg(long, env = "INTCODE_STATE_DIR", default_value = ".intcode_sessions")]
        state_dir: PathBuf,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else if quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Parse input values separated by commas and/or whitespace
fn parse_values(text: &str) -> intcode_vm::Result<Vec<i64>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| {
                Error::parse_failed(format!("invalid input value '{}'", s))
                    .with_operation("cli::parse_values")
                    .set_source(e)
            })
        })
        .collect()
}

fn load_program(file: Option<&Path>, code: Option<&str>) -> Program {
    let text = match (file, code) {
        (_, Some(code)) => code.to_string(),
        (Some(file), None) => match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Error reading {}: {}", file.display(), e);
                std::process::exit(1);
            }
        },
        (None, None) => {
            eprintln!("Error: no program given. Pass a file or --code.");
            std::process::exit(1);
        }
    };

    match Program::parse(&text) {
        Ok(program) if !program.is_empty() => program,
        Ok(_) => {
            eprintln!("Error: program is empty");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error parsing program: {}", e.message());
            std::process::exit(1);
        }
    }
}

async fn run_program(program: Program, input: &str, interactive: bool, quiet: bool) {
    let input = match parse_values(input) {
        Ok(values) => values,
        Err(e) => {
            eprintln!("Error: {}", e.message());
            std::process::exit(1);
        }
    };

    if !quiet {
        eprintln!("Running program ({} words, {} inputs)", program.len(), input.len());
    }

    let mut machine = Machine::new(program, input);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match machine.resume() {
            ExecutionResult::Output(value) => println!("{}", value),
            ExecutionResult::Halted => {
                if !quiet {
                    eprintln!("Program completed.");
                }
                return;
            }
            ExecutionResult::NeedsInput => {
                if !interactive {
                    eprintln!("Program needs more input than was given.");
                    eprintln!("Pass it with --input or rerun with --interactive.");
                    std::process::exit(1);
                }

                eprint!("input> ");
                let _ = std::io::stderr().flush();
                match stdin.next_line().await {
                    Ok(Some(line)) => match parse_values(&line) {
                        Ok(values) => machine.append_input(values),
                        Err(e) => eprintln!("Error: {}", e.message()),
                    },
                    Ok(None) => {
                        eprintln!("\nError: stdin closed while the program needs input");
                        std::process::exit(1);
                    }
                    Err(e) => {
                        eprintln!("\nError reading stdin: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            ExecutionResult::Failed(err) => {
                eprintln!("{}", program_error_message(&err));
                std::process::exit(1);
            }
        }
    }
}

fn disassemble(program: &Program) {
    for line in program.disassemble() {
        println!("{}", line);
    }
}

async fn serve(config: ServeConfig) {
    let server = match Server::new(&config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.serve(listener).await {
        eprintln!("Server stopped: {}", e);
        std::process::exit(1);
    }
}

fn list_sessions(state_dir: &Path) {
    if !state_dir.is_dir() {
        println!("No sessions directory found at {}.", state_dir.display());
        return;
    }

    let store = match FileStore::new(state_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let mut keys = match store.keys() {
        Ok(keys) => keys,
        Err(e) => {
            eprintln!("Error listing sessions: {}", e);
            std::process::exit(1);
        }
    };
    keys.sort();

    println!("Sessions in {}:", store.base_path().display());
    let mut count = 0;
    for key in keys {
        match store.get(&key) {
            Ok(Some(record)) => {
                println!("  - {:<16} {:<15} {}", key, record.status.as_str(), record.timestamp);
                count += 1;
            }
            Ok(None) => {}
            Err(e) => log::warn!("skipping {}: {}", key, e),
        }
    }
    if count == 0 {
        println!("  (no sessions found)");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run {
            file,
            code,
            input,
            interactive,
        } => {
            let program = load_program(file.as_deref(), code.as_deref());
            run_program(program, &input, interactive, cli.quiet).await;
        }
        Commands::Disasm { file, code } => {
            let program = load_program(file.as_deref(), code.as_deref());
            disassemble(&program);
        }
        Commands::Serve { bind, state_dir } => {
            let defaults = ServeConfig::default();
            let config = ServeConfig {
                bind_addr: bind.unwrap_or(defaults.bind_addr),
                state_dir,
            };
            serve(config).await;
        }
        Commands::Sessions { state_dir } => list_sessions(&state_dir),
    }
}
