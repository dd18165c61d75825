//! finops-crawler CLI - pull historical costs from billing APIs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use finops_crawler::credentials::{CredentialsResolver, EnvCredentialsResolver};
use finops_crawler::providers::build_provider;
use finops_crawler::telemetry::{self, LogFormat};
use finops_crawler::{
    CostRetriever, DateRange, EngineConfig, ResultSet, RetrievalReport, RetrievalStrategy,
};

/// Days covered when no range is given.
const DEFAULT_WINDOW_DAYS: u32 = 7;

/// finops-crawler - Retrieve historical cost data from AWS, Azure and OpenAI.
#[derive(Parser)]
#[command(name = "finops-crawler")]
#[command(about = "Retrieve historical cost data from cloud and SaaS billing APIs")]
#[command(version)]
pub struct Cli {
    /// Credentials field list (YAML). Defaults to the built-in list.
    #[arg(long, global = true, env = "FINOPS_CREDENTIALS_FILE")]
    credentials: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List platforms whose credentials are fully available
    Platforms,

    /// Retrieve costs for every scope of a provider
    Costs {
        /// Provider to query
        #[arg(long, value_enum)]
        provider: ProviderName,

        /// First day (YYYY-MM-DD). Defaults to seven days before --end.
        #[arg(long)]
        start: Option<String>,

        /// Last day (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Use the detailed cost report instead of the paginated query
        #[arg(long)]
        detailed: bool,

        /// Scopes retrieved at once (overrides FINOPS_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Give up after this many rate-limit retries (overrides FINOPS_RATE_LIMIT_MAX_RETRIES)
        #[arg(long)]
        max_rate_limit_retries: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProviderName {
    Aws,
    Azure,
    Openai,
}

impl ProviderName {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Openai => "openai",
        }
    }
}

/// JSON document written to stdout by `costs`.
#[derive(Serialize)]
struct CostsOutput<'a> {
    provider: &'static str,
    range: DateRange,
    strategy: RetrievalStrategy,
    results: Vec<&'a ResultSet>,
    failures: Vec<FailureOutput>,
}

#[derive(Serialize)]
struct FailureOutput {
    scope: String,
    error: String,
}

impl<'a> CostsOutput<'a> {
    fn new(report: &'a RetrievalReport, range: DateRange, strategy: RetrievalStrategy) -> Self {
        Self {
            provider: report.provider,
            range,
            strategy,
            results: report.successes().collect(),
            failures: report
                .failures()
                .map(|f| FailureOutput {
                    scope: f.scope.to_string(),
                    error: f.source.to_string(),
                })
                .collect(),
        }
    }
}

fn resolve_range(start: Option<String>, end: Option<String>) -> Result<DateRange> {
    let range = match (start, end) {
        (None, None) => DateRange::last_days(DEFAULT_WINDOW_DAYS),
        (Some(start), Some(end)) => DateRange::parse(start, end)?,
        (Some(start), None) => {
            DateRange::parse(start, chrono::Utc::now().date_naive())?
        }
        (None, Some(end)) => {
            let end: NaiveDate = finops_crawler::DateInput::from(end).resolve()?;
            DateRange::new(end - chrono::Duration::days(DEFAULT_WINDOW_DAYS.into()), end)?
        }
    };
    Ok(range)
}

fn resolver(path: Option<&PathBuf>) -> Result<EnvCredentialsResolver> {
    let resolver = match path {
        Some(path) => EnvCredentialsResolver::from_file(path)
            .with_context(|| format!("Failed to load credentials config {}", path.display()))?,
        None => EnvCredentialsResolver::from_env()?,
    };
    Ok(resolver)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Platforms => {
            let platforms = resolver(cli.credentials.as_ref())?.list_available_platforms();
            println!("{}", serde_json::to_string_pretty(&platforms)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Costs {
            provider,
            start,
            end,
            detailed,
            concurrency,
            max_rate_limit_retries,
        } => {
            let range = resolve_range(start, end)?;
            let strategy = if detailed {
                RetrievalStrategy::Report
            } else {
                RetrievalStrategy::Paginated
            };

            let mut config = EngineConfig::from_env().context("Invalid engine configuration")?;
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency.max(1);
            }
            if max_rate_limit_retries.is_some() {
                config.max_rate_limit_retries = max_rate_limit_retries;
            }

            let resolver = resolver(cli.credentials.as_ref())?;
            let provider = build_provider(provider.as_str(), &resolver)?;
            let retriever = CostRetriever::new(provider, config);

            let token = retriever.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling retrieval");
                    token.cancel();
                }
                // In-flight requests only end at their timeout; a second
                // interrupt exits right away.
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted again, exiting");
                    std::process::exit(130);
                }
            });

            info!(range = %range, strategy = %strategy, "Starting retrieval");
            let report = retriever
                .retrieve_all(&range, strategy)
                .await
                .context("Cost retrieval failed")?;

            let output = CostsOutput::new(&report, range, strategy);
            println!("{}", serde_json::to_string_pretty(&output)?);

            Ok(if report.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
