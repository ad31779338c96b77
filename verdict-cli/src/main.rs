//! Verdict CLI - run analyses from the terminal or serve them over HTTP.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use verdict_core::{Depth, Style};

/// Verdict: multi-role business analysis with layered verification
#[derive(Parser, Debug)]
#[command(name = "verdict", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads `.verdict/config.toml` from here)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Host to bind to (overrides `[server].host`)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides `[server].port`)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Analyze one question and print the report
    Analyze {
        /// The question, in your own words
        question: String,
        /// quick, standard, or deep
        #[arg(long)]
        depth: Option<Depth>,
        /// professional, plain, or investor
        #[arg(long)]
        style: Option<Style>,
        /// Skip the cache read
        #[arg(long)]
        no_cache: bool,
        /// Leave out the glossary
        #[arg(long)]
        no_explain: bool,
        /// Print raw events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List the loaded role roster
    Roles,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective merged configuration as TOML
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "verdict", "verdict")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "verdict.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.quiet).await
}
