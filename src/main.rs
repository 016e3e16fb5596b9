use std::path::PathBuf;

use clap::{Parser, Subcommand};

use newsfeed::config::Config;
use newsfeed::db::Repository;
use newsfeed::error::{AppError, Result};
use newsfeed::models::normalize_keyword;
use newsfeed::newsapi::NewsApiClient;
use newsfeed::pipeline::run_configured;
use newsfeed::scheduler;
use newsfeed::services::{register_user, seed_countries, sync_sources, Registration};

#[derive(Parser)]
#[command(name = "newsfeed")]
#[command(about = "Personalized news aggregation backend")]
#[command(version)]
struct Cli {
    /// Config file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config file)
    #[arg(long, global = true)]
    db: Option<String>,

    /// News API key (overrides config file)
    #[arg(long, env = "NEWSAPI_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion pipeline once
    Fetch,

    /// Run the ingestion pipeline on a fixed interval until Ctrl-C
    Schedule {
        /// Seconds between runs (defaults to fetch_interval_secs from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Insert or refresh the built-in country list
    SeedCountries,

    /// Refresh the source directory from the news API
    SyncSources,

    /// Create a user with default preferences and print their token
    Register {
        /// Username or email address
        login: String,
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },

    /// Show or replace a user's preferences
    Prefs {
        username: String,
        /// Comma-separated keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Option<Vec<String>>,
        /// Comma-separated ISO country codes
        #[arg(long, value_delimiter = ',')]
        countries: Option<Vec<String>>,
        /// Comma-separated source ids (e.g. bbc-news)
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
    },

    /// Print a user's matched articles, newest first
    Feed {
        username: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

impl Commands {
    fn uses_news_api(&self) -> bool {
        matches!(
            self,
            Commands::Fetch | Commands::Schedule { .. } | Commands::SyncSources
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Commands::Fetch => "fetch",
            Commands::Schedule { .. } => "schedule",
            Commands::SeedCountries => "seed-countries",
            Commands::SyncSources => "sync-sources",
            Commands::Register { .. } => "register",
            Commands::Prefs { .. } => "prefs",
            Commands::Feed { .. } => "feed",
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(key) = cli.api_key {
        config.newsapi_key = Some(key);
    }

    if cli.command.uses_news_api() && config.api_key().is_none() {
        tracing::error!("Cannot run {}: no news API key configured", cli.command.name());
        return Err(AppError::MissingApiKey);
    }

    let repo = Repository::new(&config.db_path).await?;

    match cli.command {
        Commands::Fetch => {
            let report = run_configured(&config, &repo).await?;
            println!(
                "Fetched {} articles: {} new, {} rejected, {} new feed entries",
                report.articles_fetched,
                report.link.articles_created,
                report.link.articles_rejected,
                report.link.links_created
            );
        }
        Commands::Schedule { interval } => {
            let client = NewsApiClient::from_config(&config)?;
            let every = interval
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.fetch_interval());
            if every.is_zero() {
                return Err(AppError::Config("interval must be positive".into()));
            }
            let runs =
                scheduler::run_every(&repo, &client, &config.ingest, every, scheduler::ctrl_c())
                    .await?;
            println!("Completed {} runs", runs);
        }
        Commands::SeedCountries => {
            let report = seed_countries(&repo).await?;
            println!(
                "Countries: {} added, {} renamed, {} unchanged",
                report.created, report.renamed, report.unchanged
            );
        }
        Commands::SyncSources => {
            let client = NewsApiClient::from_config(&config)?;
            let report = sync_sources(&repo, &client).await?;
            println!(
                "Sources: {} added, {} updated, {} countries failed",
                report.created, report.updated, report.failed_countries
            );
        }
        Commands::Register {
            login,
            password,
            first_name,
            last_name,
        } => {
            let registration = Registration {
                login,
                password,
                first_name,
                last_name,
            };
            let registered = register_user(&repo, registration, &config.default_seed).await?;
            println!("Registered {}", registered.user.username);
            println!("Token: {}", registered.token.key);
        }
        Commands::Prefs {
            username,
            keywords,
            countries,
            sources,
        } => {
            let user = repo
                .find_user_by_username(&username)
                .await?
                .ok_or_else(|| AppError::UnknownUser(username.clone()))?;

            if let Some(keywords) = keywords {
                let keywords: Vec<String> =
                    keywords.iter().filter_map(|k| normalize_keyword(k)).collect();
                repo.set_keywords(user.id, keywords).await?;
            }
            if let Some(countries) = countries {
                let requested = countries.len();
                let matched = repo.set_preferred_countries(user.id, countries).await?;
                if matched < requested {
                    tracing::warn!("{} of {} countries not found", requested - matched, requested);
                }
            }
            if let Some(sources) = sources {
                let requested = sources.len();
                let matched = repo.set_preferred_sources(user.id, sources).await?;
                if matched < requested {
                    tracing::warn!("{} of {} sources not found", requested - matched, requested);
                }
            }

            let prefs = repo
                .preferences_for_user(user.id)
                .await?
                .ok_or_else(|| AppError::UnknownUser(username.clone()))?;
            let countries: Vec<&str> = prefs.countries.iter().map(|c| c.iso_code.as_str()).collect();
            let sources: Vec<&str> = prefs
                .sources
                .iter()
                .map(|s| s.external_id.as_str())
                .collect();
            println!("User:      {}", prefs.username);
            println!("Keywords:  {}", prefs.keywords.join(", "));
            println!("Countries: {}", countries.join(", "));
            println!("Sources:   {}", sources.join(", "));
        }
        Commands::Feed { username, limit } => {
            let user = repo
                .find_user_by_username(&username)
                .await?
                .ok_or_else(|| AppError::UnknownUser(username.clone()))?;

            let entries = repo.user_feed(user.id, limit).await?;
            if entries.is_empty() {
                println!("No articles yet for {}", username);
            }
            for entry in entries {
                let article = entry.article;
                println!(
                    "{}  {}",
                    article.published_at.format("%Y-%m-%d %H:%M"),
                    article.title
                );
                if let Some(source) = &article.source_name {
                    println!("    {}", source);
                }
                println!("    {}", article.canonical_url);
            }
        }
    }

    Ok(())
}
