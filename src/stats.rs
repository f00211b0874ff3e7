//! Store statistics and health overview.
//!
//! A quick summary of what's stored: point and segment counts, vector
//! collections, and database size. Used by `synapse stats` to give
//! confidence that ingestion is landing where it should.

use std::path::Path;

use crate::error::Result;
use crate::kv::{prefix_end, KvStore};
use crate::vector::VectorIndex;

/// Counts gathered from the KV store and vector index.
pub struct StoreStats {
    pub points: u64,
    pub segments: u64,
    pub total_keys: u64,
    pub collections: Vec<String>,
}

pub async fn collect_stats(kv: &dyn KvStore, vectors: &dyn VectorIndex) -> Result<StoreStats> {
    let points = kv.range_scan("point:", &prefix_end("point:")).await?.len() as u64;
    // Each segment is a key pair; count one side.
    let segments = kv.range_scan("seg:in:", &prefix_end("seg:in:")).await?.len() as u64;
    let total_keys = kv.count().await?;
    let collections = vectors.list_collections().await?;
    Ok(StoreStats {
        points,
        segments,
        total_keys,
        collections,
    })
}

/// Run the stats command: query the backends and print a summary.
pub async fn run_stats(kv: &dyn KvStore, vectors: &dyn VectorIndex, db_path: &Path) -> Result<()> {
    let stats = collect_stats(kv, vectors).await?;

    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    println!("Synapse — Store Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Points:      {}", stats.points);
    println!("  Segments:    {}", stats.segments);
    println!("  Total keys:  {}", stats.total_keys);
    println!();
    println!("  Collections: {}", stats.collections.join(", "));
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
