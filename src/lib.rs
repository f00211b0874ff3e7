//! # Synapse
//!
//! **A hybrid point/segment knowledge store with content ingestion and
//! a stale-while-revalidate cache.**
//!
//! Synapse unifies a key-value metadata store and a vector index into
//! one logical entity set of points (knowledge nodes) joined by
//! segments (directed edges), and feeds it through a parsing and
//! embedding pipeline that turns raw text, JSON, or OWL/RDF payloads
//! into a parent-child graph of searchable fragments.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────────┐
//! │   Parsers    │──▶│  Pipeline   │──▶│   Hybrid Store    │
//! │ text/json/owl│   │ parse+embed │   │ points + segments │
//! └──────────────┘   └──────┬──────┘   └────────┬──────────┘
//!                           │                   │
//!                    ┌──────▼──────┐   ┌────────▼──────────┐
//!                    │  Embedding  │   │  KV  │  Vectors   │
//!                    │  provider   │   │ sqlite / memory   │
//!                    └─────────────┘   └───────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The **pipeline** ([`ingest`]) picks a parser by content type (or
//!    auto-detection) from the [`parser`] registry.
//! 2. The parser emits ordered [`parser::ContentFragment`]s.
//! 3. The **embedding provider** ([`embedding`]) embeds all fragments
//!    in one batch.
//! 4. The **hybrid store** ([`graph`]) materializes one resource point
//!    (no vector) plus one fragment point per fragment, each linked by
//!    a segment, coordinating the [`kv`] and [`vector`] backends.
//! 5. Searches embed the query (or take a caller vector) and run a
//!    filtered kNN against the vector index.
//!
//! Alongside the store, the [`cache`] module provides a process-wide
//! TTL cache with single-flight refill and stale-while-revalidate
//! background refresh.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Crate-wide error taxonomy |
//! | [`kv`] | Ordered key-value store trait + memory/SQLite backends |
//! | [`vector`] | Vector index trait + memory/SQLite backends |
//! | [`embedding`] | Embedding provider trait, OpenAI implementation |
//! | [`ids`] | Monotonic id allocation for points and segments |
//! | [`graph`] | Hybrid point/segment store over KV + vectors |
//! | [`parser`] | Text, JSON, and OWL/RDF payload parsers |
//! | [`ingest`] | Parse → embed → materialize pipeline |
//! | [`cache`] | TTL cache with single-flight and stale-while-revalidate |
//! | [`stats`] | Store statistics for the CLI |
//! | [`db`] | SQLite connection pool with WAL mode |

pub mod cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod ids;
pub mod ingest;
pub mod kv;
pub mod parser;
pub mod stats;
pub mod vector;
