use clap::{Parser, Subcommand};
use sibyl_answer::config::AppConfig;
use sibyl_answer::completion::OpenAiChat;
use sibyl_answer::context::ContextBuilder;
use sibyl_answer::service::{AnswerEvent, AnswerService, RenderedAnswer};
use sibyl_embed::OpenAiEmbedder;
use sibyl_embed::config::API_KEY_ENV;
use sibyl_retriever::retrieval::build_engine::BuildEngine;
use sibyl_retriever::retrieval::corpus_store::CorpusStore;
use sibyl_retriever::retrieval::embedding_cache::EmbeddingCache;
use sibyl_retriever::retrieval::fetcher::HttpFetcher;
use sibyl_retriever::retrieval::nn_index::{FlatCosineIndex, NearestNeighborIndex};
use sibyl_retriever::retrieval::search_engine::SearchEngine;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Build a corpus from web pages and answer questions against it with cited
/// sources.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file (defaults to ./sibyl.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory holding the corpus database
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, chunk, and embed the configured URLs into the corpus store
    Build,
    /// Answer a question with inline citations
    Ask {
        /// The question to answer
        question: String,
    },
    /// Show the ranked search results for a question without generating
    Search {
        /// The question to search for
        question: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 8)]
        top_k: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    match args.command {
        Commands::Build => run_build(&config).await,
        Commands::Ask { question } => run_ask(&config, &question).await,
        Commands::Search {
            question,
            top_k,
            format,
        } => run_search(&config, &question, top_k, format).await,
    }
}

fn require_api_key() -> anyhow::Result<String> {
    std::env::var(API_KEY_ENV)
        .map_err(|_| anyhow::anyhow!("environment variable {API_KEY_ENV} is not set"))
}

async fn run_build(config: &AppConfig) -> anyhow::Result<()> {
    let api_key = require_api_key()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let store = CorpusStore::open(&config.data_dir).await?;
    let embedder = Arc::new(OpenAiEmbedder::new(config.embed_config(api_key))?);
    let cache = EmbeddingCache::load(store.clone(), embedder, config.cache_config()).await?;
    let fetcher = Arc::new(HttpFetcher::new()?);

    let mut engine = BuildEngine::new(config.build_config(), store, fetcher, cache)?;
    let stats = engine.run().await?;

    println!(
        "Corpus build finished in {:.1}s",
        stats.elapsed.as_secs_f32()
    );
    println!(
        "  pages fetched:     {} ({} failed)",
        stats.urls_fetched, stats.urls_failed
    );
    println!("  fragments created: {}", stats.fragments_created);
    println!(
        "  embedding cache:   {} hits, {} misses, {} API calls, {} fallbacks",
        stats.embedding.cache_hits,
        stats.embedding.cache_misses,
        stats.embedding.api_calls,
        stats.embedding.fallbacks
    );
    Ok(())
}

/// Loads the serving half of the pipeline: store, index, fragments, cache,
/// and the search engine over them.
async fn open_search_engine(config: &AppConfig, api_key: String) -> anyhow::Result<SearchEngine> {
    let store = CorpusStore::open(&config.data_dir).await?;
    let fragment_count = store.fragment_count().await?;
    if fragment_count == 0 {
        anyhow::bail!(
            "corpus store in {} holds no fragments; run `sibyl-answer build` first",
            config.data_dir.display()
        );
    }

    let fragments = Arc::new(store.load_fragments().await?);
    let index: Arc<dyn NearestNeighborIndex> = Arc::new(FlatCosineIndex::load(&store).await?);
    let embedder = Arc::new(OpenAiEmbedder::new(config.embed_config(api_key))?);
    let cache = Arc::new(EmbeddingCache::load(store, embedder, config.cache_config()).await?);

    Ok(SearchEngine::new(
        cache,
        index,
        fragments,
        config.search_config(),
    ))
}

async fn run_ask(config: &AppConfig, question: &str) -> anyhow::Result<()> {
    let api_key = require_api_key()?;
    let search = open_search_engine(config, api_key.clone()).await?;
    let completion = Arc::new(OpenAiChat::new(&config.api_base_url, &api_key)?);
    let service = Arc::new(AnswerService::new(
        search,
        ContextBuilder::new(config.context_config()),
        completion,
        config.completion_params(),
        config.answer_config(),
    ));

    let (tx, rx) = flume::unbounded();
    let worker = tokio::spawn({
        let service = service.clone();
        let question = question.to_string();
        async move { service.answer(&question, &tx).await }
    });

    let mut answer: Option<RenderedAnswer> = None;
    while let Ok(event) = rx.recv_async().await {
        match event {
            AnswerEvent::Snapshot(_) => eprint!("."),
            AnswerEvent::Final(rendered) => answer = Some(rendered),
        }
    }
    worker.await??;
    eprintln!();

    let answer = answer.ok_or_else(|| anyhow::anyhow!("the answer worker produced no result"))?;
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for (position, source) in answer.sources.iter().enumerate() {
            println!("  {}. {} - {}", position + 1, source.name, source.url);
        }
    }
    Ok(())
}

async fn run_search(
    config: &AppConfig,
    question: &str,
    top_k: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let api_key = require_api_key()?;
    let search = open_search_engine(config, api_key).await?;
    let results = search.search(question, top_k).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Summary => {
            println!("Found {} results:", results.len());
            for result in &results {
                let mut preview: String = result.text.chars().take(80).collect();
                if result.text.chars().count() > 80 {
                    preview.push('…');
                }
                println!(
                    "  [{:.3}] {:8} | {} | {}",
                    result.similarity,
                    result.strategy.as_str(),
                    result.source,
                    preview
                );
            }
        }
    }
    Ok(())
}
