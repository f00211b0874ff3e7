//! # Synapse CLI
//!
//! The `synapse` binary drives the store from the command line:
//! database initialization, payload ingestion, filtered search, and a
//! stats overview.
//!
//! ```bash
//! synapse --config ./config/synapse.toml init
//! synapse ingest ./notes.txt --content-type auto
//! synapse search "pet ontology" --dimension 1 --limit 5
//! synapse stats
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use synapse::config::{load_config, Config};
use synapse::db;
use synapse::embedding::{create_provider, EmbeddingProvider};
use synapse::graph::{HybridStore, SearchRequest};
use synapse::ingest::{IngestRequest, Pipeline};
use synapse::kv::{sqlite::SqliteKv, KvStore};
use synapse::parser::ParserRegistry;
use synapse::stats::run_stats;
use synapse::vector::{sqlite::SqliteVectorIndex, Distance, VectorIndex};

/// Synapse — a hybrid point/segment knowledge store.
#[derive(Parser)]
#[command(name = "synapse", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/synapse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and the vector collection.
    Init,
    /// Parse, embed, and store a payload file.
    Ingest {
        /// File containing the payload.
        file: PathBuf,
        /// Resource identifier; defaults to the file stem.
        #[arg(long)]
        resource_id: Option<String>,
        /// One of text, json, owl, auto.
        #[arg(long, default_value = "auto")]
        content_type: String,
        /// Tenant scope applied to every created point.
        #[arg(long)]
        singularity: Option<i64>,
        /// User attribution.
        #[arg(long)]
        user: Option<i64>,
    },
    /// Embed a query and run a filtered vector search.
    Search {
        query: String,
        #[arg(long)]
        dimension: Option<i32>,
        #[arg(long)]
        layer: Option<i32>,
        #[arg(long)]
        singularity: Option<i64>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0.0)]
        threshold: f32,
    },
    /// Print point/segment counts and database size.
    Stats,
}

struct Backends {
    kv: Arc<dyn KvStore>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<HybridStore>,
}

async fn open_backends(config: &Config) -> Result<Backends> {
    let pool = db::connect(&config.store.db_path).await?;
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(pool.clone()).await?);
    let vectors: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::open(pool).await?);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);

    let store = HybridStore::open(
        kv.clone(),
        vectors.clone(),
        embedder.clone(),
        &config.store.collection,
        config.store.vector_size,
        Distance::parse(&config.store.distance)?,
        &config.embedding.embedding_type,
    )
    .await?;

    Ok(Backends {
        kv,
        vectors,
        embedder,
        store: Arc::new(store),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            open_backends(&config).await?;
            println!("initialized {}", config.store.db_path.display());
        }
        Commands::Ingest {
            file,
            resource_id,
            content_type,
            singularity,
            user,
        } => {
            let payload = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read payload file: {}", file.display()))?;
            let resource_id = resource_id.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "resource".to_string())
            });

            let backends = open_backends(&config).await?;
            let pipeline = Pipeline::new(
                backends.store.clone(),
                ParserRegistry::with_defaults(&config.parsing),
                backends.embedder.clone(),
                &config.embedding.embedding_type,
            );

            let mut request = IngestRequest::new(payload, resource_id);
            request.content_type = content_type;
            request.singularity_id = singularity;
            request.user_id = user;

            let result = pipeline.ingest(request).await?;
            println!("ingest ({})", result.parser_type);
            println!("  resource point: {}", result.resource_point_id);
            println!(
                "  fragments stored: {} / {}",
                result.fragment_point_ids.len(),
                result.total_fragments
            );
            println!("  segments: {}", result.segment_ids.len());
            println!("ok");
        }
        Commands::Search {
            query,
            dimension,
            layer,
            singularity,
            limit,
            threshold,
        } => {
            if !config.embedding.is_enabled() {
                anyhow::bail!(
                    "Search requires an embedding provider. Set [embedding] provider in config."
                );
            }
            let backends = open_backends(&config).await?;
            let hits = backends
                .store
                .search(SearchRequest {
                    query: Some(query),
                    query_embedding: None,
                    singularity_id: singularity,
                    dimension,
                    layer,
                    limit,
                    score_threshold: threshold,
                })
                .await?;

            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                let excerpt = hit
                    .payload
                    .get("payload")
                    .and_then(|v| v.as_str())
                    .unwrap_or("(no text)")
                    .chars()
                    .take(120)
                    .collect::<String>();
                println!("{}. [{:.3}] point {}", i + 1, hit.score, hit.id);
                println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
            }
        }
        Commands::Stats => {
            let backends = open_backends(&config).await?;
            run_stats(
                backends.kv.as_ref(),
                backends.vectors.as_ref(),
                &config.store.db_path,
            )
            .await?;
        }
    }

    Ok(())
}
