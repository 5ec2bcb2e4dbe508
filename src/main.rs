use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doselog::{cli, config, server};

#[derive(Parser)]
#[command(name = "doselog", version, about = "Medication directions, dose log and due-dose reminders")]
struct Cli {
    /// Config file (defaults to ~/.doselog/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (HTTP API + scheduler, or MCP over stdio)
    Serve {
        /// "http" or "stdio"; overrides server.transport
        #[arg(long)]
        transport: Option<String>,
    },
    /// Parse prescription shorthand and print the direction
    Parse {
        /// e.g. "Metformin 500mg PO bid"
        text: Vec<String>,
    },
    /// Format a direction (JSON) as shorthand
    Format {
        json: String,
    },
    /// Record a dose
    Take {
        /// Medication key name or full name
        med: String,
        /// Amount; defaults to the prescribed dosage
        #[arg(long)]
        dose: Option<i64>,
        /// When it was taken (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Remove a recorded dose
    Undo {
        uuid: String,
        /// Medication the dose belongs to
        #[arg(long)]
        med: String,
        /// Roughly when the dose was taken (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Show what is due
    Info {
        /// Medications to show; all when empty
        meds: Vec<String>,
    },
    /// Recompute stored dose offsets
    Recalc {
        /// First month, YYYY-MM (default 2000-01)
        #[arg(long)]
        from: Option<String>,
        /// Last month, YYYY-MM (default: current month)
        #[arg(long)]
        to: Option<String>,
    },
    /// Run database diagnostics
    Doctor,
}

/// `RUST_LOG` wins over the configured level; anything unparsable falls back to `info`.
fn log_filter(rust_log: Option<&str>, configured: &str) -> EnvFilter {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::DoselogConfig::load_from(path)?,
        None => config::DoselogConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(rust_log.as_deref(), &config.server.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "http" => server::serve_http(config).await?,
                "stdio" => server::serve_stdio(config).await?,
                other => bail!("unknown transport: '{other}'. Use 'http' or 'stdio'"),
            }
        }
        Command::Parse { text } => cli::shorthand::parse(&text.join(" "))?,
        Command::Format { json } => cli::shorthand::format(&json)?,
        Command::Take { med, dose, at } => cli::dose::take(&config, &med, dose, at.as_deref())?,
        Command::Undo { uuid, med, at } => cli::dose::undo(&config, &med, &uuid, at.as_deref())?,
        Command::Info { meds } => cli::dose::info(&config, &meds)?,
        Command::Recalc { from, to } => cli::recalc::recalc(&config, from.as_deref(), to.as_deref())?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_overrides_configured_level() {
        assert_eq!(log_filter(Some("debug"), "warn").to_string(), "debug");
        assert_eq!(log_filter(None, "warn").to_string(), "warn");
        assert_eq!(log_filter(Some(""), "warn").to_string(), "warn");
    }
}
