//! mimir — ask grounded questions over a local corpus.
//!
//! Loads a JSON corpus, embeds it into an in-memory index, answers each
//! query and prints the responses as JSON.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures_util::StreamExt;
use llm::builder::LLMBackend;
use serde::Deserialize;
use tracing::info;

use mimir::cache::SharedCache;
use mimir::config::file::{FileConfig, api_key};
use mimir::providers::openai_embeddings::DEFAULT_BASE_URL;
use mimir::providers::{
    EmbeddingBackend, IndexedPassage, InMemoryVectorIndex, LlmGenerationBackend,
    OpenAiEmbeddingClient,
};
use mimir::{MimirError, PassageMetadata, QueryEvent, QueryRequest, RetrievalOrchestrator};

/// Passages embedded per backend call while loading the corpus.
const INDEX_BATCH: usize = 64;

/// Mimir — cached retrieval and grounded answers.
#[derive(Parser)]
#[command(name = "mimir")]
#[command(version)]
#[command(about = "Answer questions from a document corpus with citations")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON array of passages to index.
    #[arg(long, env = "MIMIR_CORPUS")]
    corpus: PathBuf,

    /// Number of passages to retrieve.
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Minimum similarity score (0.0 - 1.0).
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Print answer text as it is generated.
    #[arg(long)]
    stream: bool,

    /// Print cache statistics to stderr when done.
    #[arg(long)]
    stats: bool,

    /// Questions to answer.
    #[arg(required = true)]
    queries: Vec<String>,
}

/// One corpus entry.
#[derive(Deserialize)]
struct CorpusPassage {
    passage_id: String,
    document_id: String,
    title: String,
    text: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let file = FileConfig::load(args.config.as_deref())?;
    let config = file.retrieval_config()?;

    let embedder = build_embedder(&file)?;
    let index = Arc::new(InMemoryVectorIndex::new());
    load_corpus(&args.corpus, embedder.as_ref(), &index).await?;

    let mut builder = RetrievalOrchestrator::builder()
        .config(config)
        .embedder(embedder)
        .index(index.clone())
        .generator(Arc::new(build_generator(&file)?));
    if let Some(shared) = build_shared_cache(&file).await? {
        builder = builder.shared_cache(shared);
    }
    let orchestrator = builder.build()?;
    index.add_listener(orchestrator.search_cache());

    for text in &args.queries {
        let mut request = QueryRequest::new(text.clone());
        if let Some(k) = args.top_k {
            request = request.top_k(k);
        }
        if let Some(t) = args.threshold {
            request = request.score_threshold(t);
        }

        if args.stream {
            stream_query(&orchestrator, request).await?;
        } else {
            let response = orchestrator.query(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    if args.stats {
        let stats: serde_json::Map<String, serde_json::Value> = orchestrator
            .cache_stats()
            .snapshot()
            .into_iter()
            .map(|(namespace, s)| {
                let value = serde_json::json!({
                    "l1_hits": s.l1_hits,
                    "l1_misses": s.l1_misses,
                    "l2_hits": s.l2_hits,
                    "l2_misses": s.l2_misses,
                    "l2_errors": s.l2_errors,
                    "promotions": s.promotions,
                    "hit_rate": s.hit_rate(),
                });
                (namespace, value)
            })
            .collect();
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }

    orchestrator.shutdown().await;
    Ok(())
}

async fn stream_query(
    orchestrator: &RetrievalOrchestrator,
    request: QueryRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = orchestrator.query_stream(request);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event? {
            QueryEvent::Retrieved { sources, .. } => {
                info!(sources = sources.len(), "retrieved");
            }
            QueryEvent::Token(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            QueryEvent::Done(response) => {
                writeln!(stdout)?;
                println!("{}", serde_json::to_string_pretty(&response.citations)?);
            }
        }
    }
    Ok(())
}

fn build_embedder(file: &FileConfig) -> Result<Arc<dyn EmbeddingBackend>, MimirError> {
    let section = &file.embedding;
    match section.provider.as_str() {
        "openai" => {
            let base_url = section.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
            Ok(Arc::new(OpenAiEmbeddingClient::with_base_url(
                api_key("openai"),
                section.model.clone(),
                base_url,
            )))
        }
        #[cfg(feature = "local-inference")]
        "local" => {
            use mimir::providers::{LocalEmbeddingBackend, LocalEmbeddingModel};

            let model = LocalEmbeddingModel::from_name(&section.model).ok_or_else(|| {
                MimirError::Configuration(format!("unknown local model: {}", section.model))
            })?;
            Ok(Arc::new(LocalEmbeddingBackend::new(model)?))
        }
        other => Err(MimirError::Configuration(format!(
            "unsupported embedding provider: {other}"
        ))),
    }
}

fn build_generator(file: &FileConfig) -> Result<LlmGenerationBackend, MimirError> {
    let section = &file.generation;
    let backend = match section.provider.as_str() {
        "openrouter" => LLMBackend::OpenRouter,
        "anthropic" => LLMBackend::Anthropic,
        "openai" => LLMBackend::OpenAI,
        "google" => LLMBackend::Google,
        "ollama" => LLMBackend::Ollama,
        other => {
            return Err(MimirError::Configuration(format!(
                "unsupported generation provider: {other}"
            )));
        }
    };

    let key = api_key(&section.provider);
    if key.is_none() && backend != LLMBackend::Ollama {
        return Err(MimirError::Configuration(format!(
            "no API key for {} in the environment",
            section.provider
        )));
    }

    let mut generator = LlmGenerationBackend::new(backend, key, section.model.clone());
    if let Some(url) = &section.ollama_url {
        generator = generator.ollama_url(url.clone());
    }
    if let Some(t) = section.temperature {
        generator = generator.temperature(t);
    }
    if let Some(max) = section.max_tokens {
        generator = generator.max_tokens(max);
    }
    Ok(generator)
}

async fn build_shared_cache(file: &FileConfig) -> Result<Option<Arc<dyn SharedCache>>, MimirError> {
    let Some(url) = &file.cache.redis_url else {
        return Ok(None);
    };

    #[cfg(feature = "redis")]
    {
        let shared = mimir::cache::RedisSharedCache::connect(url).await?;
        shared.ping().await?;
        info!("connected to shared cache");
        Ok(Some(Arc::new(shared)))
    }

    #[cfg(not(feature = "redis"))]
    {
        Err(MimirError::Configuration(format!(
            "redis_url {url} is set but mimir was built without the `redis` feature"
        )))
    }
}

async fn load_corpus(
    path: &std::path::Path,
    embedder: &dyn EmbeddingBackend,
    index: &InMemoryVectorIndex,
) -> Result<(), MimirError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MimirError::Configuration(format!("failed to read corpus {path:?}: {e}")))?;
    let passages: Vec<CorpusPassage> = serde_json::from_str(&content)?;

    let mut indexed = Vec::with_capacity(passages.len());
    for chunk in passages.chunks(INDEX_BATCH) {
        let texts: Vec<&str> = chunk.iter().map(|p| p.text.as_str()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        for (passage, embedding) in chunk.iter().zip(vectors) {
            let mut metadata =
                PassageMetadata::new(passage.document_id.clone()).with_authors(passage.authors.clone());
            metadata.doi = passage.doi.clone();
            metadata.external_id = passage.external_id.clone();
            metadata.source = passage.source.clone();
            indexed.push(IndexedPassage::new(
                passage.passage_id.clone(),
                passage.title.clone(),
                passage.text.clone(),
                embedding.values,
                metadata,
            ));
        }
    }

    info!(passages = indexed.len(), "corpus indexed");
    index.reindex(indexed).await;
    Ok(())
}
