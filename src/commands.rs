use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{Collection, EmbeddingStore, StoreClient};
use crate::embeddings::{EmbeddingGenerator, OllamaClient};
use crate::recommender::{RecommendationEngine, Strategy};
use crate::service::TeammateService;

/// Records written per store call while seeding
const SEED_BATCH_SIZE: usize = 256;

/// One line of a seed file: either a ready vector or a skill list
#[derive(Debug, Deserialize)]
pub struct SeedRecord {
    pub id: String,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
}

/// Open the store and build the service with the Ollama collaborators
#[inline]
pub async fn open_service(config: &Config) -> Result<TeammateService> {
    let client = Arc::new(
        StoreClient::open(config)
            .await
            .context("Failed to open vector store")?,
    );
    let store = Arc::new(
        EmbeddingStore::new(client, config.store.embedding_dimension)
            .await
            .context("Failed to initialize embedding store")?,
    );
    let engine = RecommendationEngine::from_config(Arc::clone(&store), config);
    let ollama = Arc::new(OllamaClient::new(config)?);

    Ok(TeammateService::new(store, engine)
        .with_embedder(Arc::clone(&ollama) as Arc<dyn EmbeddingGenerator>)
        .with_suggester(ollama))
}

/// Store a participant profile from skills or a raw vector
#[inline]
pub async fn set_participant(
    config: &Config,
    participant_id: &str,
    skills: &[String],
    vector: Option<Vec<f32>>,
) -> Result<()> {
    let service = open_service(config).await?;

    if let Some(vector) = vector {
        service.upsert_participant(participant_id, vector).await?;
    } else {
        service
            .update_participant_skills(participant_id, skills)
            .await?;
    }

    println!(
        "{} participant {}",
        style("✓ Stored").green(),
        style(participant_id).cyan()
    );
    Ok(())
}

/// Store a hackathon profile from skills, a JSON document or a raw vector
#[inline]
pub async fn set_hackathon(
    config: &Config,
    hackathon_id: &str,
    skills: &[String],
    document: Option<&Path>,
    vector: Option<Vec<f32>>,
) -> Result<()> {
    let service = open_service(config).await?;

    if let Some(vector) = vector {
        service.upsert_hackathon(hackathon_id, vector).await?;
    } else if let Some(path) = document {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read hackathon document: {}", path.display()))?;
        let document: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse hackathon document: {}", path.display()))?;

        let team = service
            .update_hackathon_from_document(hackathon_id, &document)
            .await?;
        println!("Dream team for {}:", style(&team.hackathon_name).bold());
        for skill in &team.required_skills {
            println!("  • {}", skill);
        }
    } else {
        service.update_hackathon_skills(hackathon_id, skills).await?;
    }

    println!(
        "{} hackathon {}",
        style("✓ Stored").green(),
        style(hackathon_id).cyan()
    );
    Ok(())
}

/// Load a JSON Lines file of `{"id", "vector" | "skills"}` records
///
/// With `append` the records are written in bulk without replacing
/// existing ids; otherwise every record is upserted.
#[inline]
pub async fn seed(config: &Config, collection: Collection, path: &Path, append: bool) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let records = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str::<SeedRecord>(line)
                .with_context(|| format!("Invalid record on line {}", number + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let service = open_service(config).await?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(records.len() as u64).with_style(
            ProgressStyle::with_template("{bar:40} [{pos}/{len}] Seeding {msg}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(collection.table_name());

    let mut written = 0_usize;
    for chunk in records.chunks(SEED_BATCH_SIZE) {
        let mut ids = Vec::with_capacity(chunk.len());
        let mut vectors = Vec::with_capacity(chunk.len());
        for record in chunk {
            let vector = seed_vector(&service, record).await?;
            ids.push(record.id.clone());
            vectors.push(vector);
        }

        if append {
            written += service.store().batch_upsert(collection, ids, vectors).await?;
        } else {
            for (id, vector) in ids.iter().zip(vectors) {
                service.store().upsert(collection, id, vector).await?;
                written += 1;
            }
        }
        bar.set_position(written as u64);
    }
    bar.finish_and_clear();

    info!("Seeded {} records into {}", written, collection.table_name());
    println!(
        "{} {} records into {}",
        style("✓ Seeded").green(),
        written,
        style(collection.table_name()).cyan()
    );
    Ok(())
}

async fn seed_vector(service: &TeammateService, record: &SeedRecord) -> Result<Vec<f32>> {
    match (&record.vector, &record.skills) {
        (Some(vector), _) => Ok(vector.clone()),
        (None, Some(skills)) => Ok(service.embed_skills(skills).await?),
        (None, None) => Err(anyhow::anyhow!(
            "Record {} has neither a vector nor skills",
            record.id
        )),
    }
}

/// Print recommendations for a participant at a hackathon
#[inline]
pub async fn recommend(
    config: &Config,
    participant_id: &str,
    hackathon_id: &str,
    top_k: Option<i64>,
    strategy: Option<Strategy>,
    json: bool,
) -> Result<()> {
    let service = open_service(config).await?;
    let top_k = top_k.unwrap_or_else(|| {
        i64::try_from(config.recommend.default_top_k).unwrap_or(i64::MAX)
    });
    let strategy = strategy.unwrap_or(config.recommend.strategy);

    let recommendations = service
        .recommend_with(strategy, participant_id, hackathon_id, top_k)
        .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&recommendations)
                .context("Failed to serialize recommendations")?
        );
        return Ok(());
    }

    if recommendations.is_empty() {
        println!("No teammates to recommend.");
        return Ok(());
    }

    println!(
        "Teammates for {} at {} ({} strategy):",
        style(participant_id).cyan(),
        style(hackathon_id).cyan(),
        strategy
    );
    for (rank, recommendation) in recommendations.iter().enumerate() {
        println!(
            "  {:>2}. {:<24} score {:.4}  distance {:.4}",
            rank + 1,
            recommendation.id,
            recommendation.score,
            recommendation.distance
        );
    }
    Ok(())
}

#[inline]
pub async fn get_record(config: &Config, collection: Collection, id: &str) -> Result<()> {
    let service = open_service(config).await?;
    let record = service.store().get(collection, id).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("Failed to serialize record")?
    );
    Ok(())
}

#[inline]
pub async fn delete_record(config: &Config, collection: Collection, id: &str) -> Result<()> {
    let service = open_service(config).await?;

    if service.store().delete(collection, id).await? {
        println!("{} {} {}", style("✓ Deleted").green(), collection, id);
    } else {
        println!("No {} with id {}", collection, id);
    }
    Ok(())
}

#[inline]
pub async fn delete_all(config: &Config, collection_name: &str) -> Result<()> {
    let service = open_service(config).await?;
    let removed = service.delete_all(collection_name).await?;

    println!(
        "{} {} records from {}",
        style("✓ Deleted").green(),
        removed,
        collection_name
    );
    Ok(())
}

/// Build the ANN index and compact the table
#[inline]
pub async fn build_index(config: &Config, collection: Collection) -> Result<()> {
    let service = open_service(config).await?;

    service
        .engine()
        .index()
        .create_index(collection)
        .await
        .context("Index build failed (IVF-PQ training needs a few hundred rows)")?;
    service.store().optimize(collection).await?;

    println!(
        "{} vector index on {}",
        style("✓ Built").green(),
        style(collection.table_name()).cyan()
    );
    Ok(())
}

/// Show detailed status of the store and the embedding backend
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Teammate Recommender Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🔍 Vector Store Status:");
    match open_service(config).await {
        Ok(service) => {
            let store = service.store();
            println!("   ✅ LanceDB: Connected ({})", store.client().uri());
            println!("   🔢 Dimension: {}", store.dimension());
            println!("   🧭 Strategy: {}", service.engine().strategy());
            for collection in Collection::ALL {
                let rows = match store.count(collection).await {
                    Ok(rows) => rows.to_string(),
                    Err(e) => format!("error - {}", e),
                };
                let indexed = match store.client().has_vector_index(collection).await {
                    Ok(true) => "IVF-PQ index",
                    Ok(false) => "flat scan",
                    Err(e) => {
                        warn!("Could not list indices for {}: {}", collection, e);
                        "index unknown"
                    }
                };
                println!(
                    "   📁 {}: {} records ({})",
                    collection.table_name(),
                    rows,
                    indexed
                );
            }
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to open - {:#}", e);
        }
    }
    println!();

    println!("🤖 Ollama Status:");
    print_ollama_health(config).await;

    Ok(())
}

/// Check the embedding backend and both models
#[inline]
pub async fn health(config: &Config) -> Result<()> {
    let client = OllamaClient::new(config)?;
    let url = client.base_url().clone();
    tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check worker failed")?
        .with_context(|| format!("Ollama at {} is unhealthy", url))?;

    println!(
        "{} Ollama at {} ({}, {})",
        style("✓ Healthy:").green(),
        url,
        config.ollama.embedding_model,
        config.ollama.generation_model
    );
    Ok(())
}

async fn print_ollama_health(config: &Config) {
    let client = match OllamaClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            println!("   ❌ Ollama: Invalid configuration - {}", e);
            return;
        }
    };

    match tokio::task::spawn_blocking(move || client.health_check()).await {
        Ok(Ok(())) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
            println!("   💡 Suggestion Model: {}", config.ollama.generation_model);
        }
        Ok(Err(e)) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
        Err(e) => println!("   ❌ Ollama: Check failed - {}", e),
    }
}
