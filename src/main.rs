use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod core;
mod cost;
mod server;

use crate::core::settings::Settings;

#[derive(Parser)]
#[command(name = "usage-dash")]
#[command(author, version, about = "Token usage and cost dashboard for agent session logs")]
struct Cli {
    /// Sessions directory to read logs from (overrides config)
    #[arg(long, global = true)]
    sessions_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the usage API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the cost report for a day
    Report {
        /// Day to report, YYYY-MM-DD (default: today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List sessions from the session registry
    Sessions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so report output on stdout stays parseable
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn load_settings(sessions_dir: Option<PathBuf>) -> Result<Settings> {
    let mut settings = Settings::load()?;
    if let Some(dir) = sessions_dir {
        settings.sessions_dir = dir;
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => {
            init_logging(cli.json_logs);
            let mut settings = load_settings(cli.sessions_dir)?;
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(host) = host {
                settings.server.host = host;
            }
            server::run(&settings).await
        }
        Commands::Report { date, json } => {
            init_logging(cli.json_logs);
            let settings = load_settings(cli.sessions_dir)?;
            cli::report::run(&settings, date, json)
        }
        Commands::Sessions { json } => {
            init_logging(cli.json_logs);
            let settings = load_settings(cli.sessions_dir)?;
            cli::sessions::run(&settings, json)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
