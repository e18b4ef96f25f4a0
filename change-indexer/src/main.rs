use clap::{Parser, Subcommand};
use tracing::{error, info};

use change_indexer::{
    config::connect_search_engine, Dependencies, IndexerSettings, IndexingError, LogFormat,
};
use change_indexer_repository::{SearchEngineClient, SearchQuery, DEFAULT_SEARCH_SIZE};

#[derive(Parser)]
#[command(name = "change-indexer")]
#[command(
    about = "Mirror change-stream events from the primary store into OpenSearch",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingest pipeline (default)
    Run,
    /// Query the search index directly
    Search {
        /// Free-text query; omit to list documents
        query: Option<String>,

        /// Index to query (default: the configured default index)
        #[arg(long)]
        index: Option<String>,

        /// Number of hits to return
        #[arg(long, default_value_t = DEFAULT_SEARCH_SIZE)]
        size: usize,

        /// Offset of the first hit
        #[arg(long, default_value_t = 0)]
        from: usize,
    },
    /// Create every configured target index that does not exist yet
    EnsureIndex,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let settings = match IndexerSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_tracing(settings.log_format);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&settings).await,
        Commands::Search {
            query,
            index,
            size,
            from,
        } => search(&settings, query, index, size, from).await,
        Commands::EnsureIndex => ensure_indexes(&settings).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Change indexer failed");
        std::process::exit(1);
    }
}

async fn run(settings: &IndexerSettings) -> Result<(), IndexingError> {
    info!("Starting change indexer");

    let mut dependencies = Dependencies::new(settings).await?;
    dependencies.orchestrator.run().await?;

    info!(stats = ?dependencies.orchestrator.stats(), "Change indexer stopped");
    Ok(())
}

async fn search(
    settings: &IndexerSettings,
    text: Option<String>,
    index: Option<String>,
    size: usize,
    from: usize,
) -> Result<(), IndexingError> {
    let index = index
        .or_else(|| settings.transformer.routing.default_index.clone())
        .ok_or_else(|| IndexingError::config("no default index configured; pass --index"))?;

    let client = connect_search_engine(&settings.opensearch).await?;

    let query = match text {
        Some(text) => SearchQuery::text(text),
        None => SearchQuery::match_all(),
    }
    .with_size(size)
    .with_from(from);

    let response = client.search(&index, &query).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

async fn ensure_indexes(settings: &IndexerSettings) -> Result<(), IndexingError> {
    let client = connect_search_engine(&settings.opensearch).await?;

    for index in settings.transformer.routing.target_indexes() {
        client.ensure_index_exists(&index).await?;
        info!(index = %index, "Index ready");
    }

    Ok(())
}
