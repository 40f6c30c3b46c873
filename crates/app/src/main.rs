use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tallyfeed_import::{
    export_file, parse_records, CamtAdapter, CandidateSources, FeedAdapter, MatchPass,
    PayeeResolver, SourceAdapter,
};
use tracing_subscriber::EnvFilter;

mod config;
mod feed_client;
mod intake;

use config::{Credentials, Settings};
use feed_client::FeedClient;

#[derive(Parser, Debug)]
#[command(name = "tallyfeed", version, about = "Normalize bank transactions into a ledger import file")]
struct Cli {
    /// Settings file (default: ./tallyfeed.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch recent transactions from the smart-banking feed and export them
    Feed {
        /// Read the feed from a saved JSON response instead of the network
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Export file (default from settings)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import CAMT statement archives from the inbound folder
    Camt {
        /// Export file (default from settings)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show which payee the given candidate texts resolve to
    Resolve {
        #[arg(required = true)]
        texts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let store = config::load_rule_store(&settings.rules).context("loading payee rules")?;
    let resolver = PayeeResolver::with_tracing(store);

    match cli.command {
        Command::Feed { input, output } => run_feed(&settings, &resolver, input, output).await,
        Command::Camt { output } => run_camt(&settings, &resolver, output),
        Command::Resolve { texts } => run_resolve(&resolver, texts),
    }
}

async fn run_feed(
    settings: &Settings,
    resolver: &PayeeResolver,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let body = match input {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("reading feed from {}", path.display()))?,
        None => {
            let credentials = Credentials::load(&settings.feed.credentials)?;
            let client = FeedClient::new(&settings.feed.base_url)?;
            let token = client
                .authenticate(credentials)
                .await
                .context("signing in to the feed API")?;
            client
                .fetch_transactions(&token, settings.feed.limit)
                .await
                .context("fetching transactions")?
        }
    };

    let records = parse_records(&body)?;
    let transactions = FeedAdapter::new(resolver).normalize_all(&records);

    let path = output.unwrap_or_else(|| settings.feed.export.clone());
    export_file(&path, &transactions).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(transactions = transactions.len(), path = %path.display(), "feed exported");
    Ok(())
}

fn run_camt(settings: &Settings, resolver: &PayeeResolver, output: Option<PathBuf>) -> anyhow::Result<()> {
    let entries = intake::collect_entries(&settings.camt, resolver.observer())?;
    let transactions = CamtAdapter::new(resolver).normalize_all(&entries);

    let path = output.unwrap_or_else(|| settings.camt.export.clone());
    export_file(&path, &transactions).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(transactions = transactions.len(), path = %path.display(), "statements exported");
    Ok(())
}

fn run_resolve(resolver: &PayeeResolver, texts: Vec<String>) -> anyhow::Result<()> {
    let sources = CandidateSources::new(texts)?;
    let resolution = resolver.resolve_with_rule(&sources);
    let how = match resolution.matched {
        Some(MatchPass::Prefix) => "prefix rule",
        Some(MatchPass::Contains) => "containment rule",
        None => "no rule, fallback",
    };
    println!("{}\t({how})", resolution.payee);
    Ok(())
}
