//! VibeSec CLI - Command-line interface for the VibeSec security scanner
//!
//! Scans source trees for vulnerability patterns using regex rules and
//! structural EQL queries.

mod commands;
mod output;

use clap::Parser;
use commands::Commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "vibesec",
    author,
    version,
    about = "Security scanner for AI-generated code",
    long_about = "VibeSec scans source files for injection flaws, leaked secrets and\n\
                  unsafe configuration.\n\n\
                  Rules combine plain regex patterns with structural EQL queries that\n\
                  follow untrusted data from its source to a dangerous sink."
)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Scan(args) => args.run(),
        Commands::Rules(args) => args.run(),
        Commands::Explain(args) => args.run(),
    }
}
