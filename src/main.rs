use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use siem_alerts::{
    config::{ObservabilityConfig, SiemConfig},
    models::AlertQuery,
    source::{build_source, SiemBackend},
};
use std::path::PathBuf;
use strum::IntoEnumIterator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One leap year
const MAX_LOOKBACK_MINUTES: i64 = 527_040;

#[derive(Parser)]
#[command(name = "siem-alerts")]
#[command(about = "List security alerts from SIEM backends", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "SIEM_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List alerts from a backend
    List {
        /// datadog, elastic or acumen_elastic
        #[arg(value_name = "BACKEND")]
        backend: SiemBackend,

        /// Window start (RFC 3339)
        #[arg(long, requires = "end")]
        start: Option<DateTime<Utc>>,

        /// Window end (RFC 3339)
        #[arg(long, requires = "start")]
        end: Option<DateTime<Utc>>,

        /// Window length ending now, used when --start/--end are absent
        #[arg(
            short = 'm',
            long,
            default_value = "60",
            value_parser = clap::value_parser!(i64).range(1..=MAX_LOOKBACK_MINUTES)
        )]
        lookback_minutes: i64,

        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Backend-native query string
        #[arg(short, long)]
        query: Option<String>,

        /// Print vendor records instead of normalized alerts
        #[arg(long)]
        raw: bool,
    },

    /// List the available integrations
    Backends,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = SiemConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.observability);

    match cli.command {
        Commands::List {
            backend,
            start,
            end,
            lookback_minutes,
            limit,
            query,
            raw,
        } => {
            let mut alert_query = match (start, end) {
                (Some(start), Some(end)) => AlertQuery::new(start, end),
                _ => AlertQuery::last_minutes(lookback_minutes)?,
            }
            .with_limit(limit);
            if let Some(filter) = query {
                alert_query = alert_query.with_filter(filter);
            }

            let source = build_source(backend, &config)?;
            tracing::info!(backend = %backend, limit = limit, "Listing alerts");

            let output = if raw {
                serde_json::to_string_pretty(&source.search_raw(&alert_query).await?)?
            } else {
                serde_json::to_string_pretty(&source.list_alerts(&alert_query).await?)?
            };
            println!("{}", output);
        }

        Commands::Backends => {
            for backend in SiemBackend::iter() {
                println!("{:<16} {}", backend, backend.list_function());
            }
        }
    }

    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("siem_alerts={}", config.log_level).into());

    // Logs go to stderr so stdout stays valid JSON
    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
