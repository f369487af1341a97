//! Strand: Wikipedia link graph ingestion
//!
//! Streams a bzip2-compressed MediaWiki export, extracts every `[[wiki link]]`
//! from article bodies and loads the result into a graph store as one `article`
//! vertex per distinct name and one `link` edge per occurrence.
//!
//! # Pipeline
//!
//! 1. **Decompression** -- [`decompress::ByteStreamer`] turns the archive into a
//!    byte stream one compressed window at a time, across concatenated streams
//! 2. **Extraction** -- [`parser::LinkExtractor`] pulls `(source, target)` pairs out
//!    of the XML, skipping blacklisted titles and redirect pages
//! 3. **Chunking** -- [`batch::Batches`] groups pairs into fixed-size chunks
//! 4. **Identity resolution** -- [`articles::insert_articles`] gives each new name a
//!    vertex, names it, and persists the mapping in SQLite
//! 5. **Link commit** -- [`links::insert_links`] writes one transaction of edges per chunk
//!
//! [`pipeline::run_ingest`] drives the steps above and checkpoints committed chunks
//! so an interrupted run can resume without duplicating edges.
//!
//! # Key Modules
//!
//! - [`graph`] -- Graph store abstraction with Neo4j and in-memory backends
//! - [`store`] -- Durable name-to-id mapping and account credentials (SQLite)
//! - [`account`] -- Credential bootstrap from an external account tool
//! - [`server`] -- Lifetime management of a graph store server process
//! - [`explore`] -- Read-only article lookup for `strand show`
//! - [`checkpoint`] -- Chunk-level progress checkpointing
//! - [`stats`] -- Atomic counters for ingestion metrics
//! - [`config`] -- Constants and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Ingest into a Neo4j instance that is already running
//! strand ingest enwiki-latest-pages-articles.xml.bz2 --password secret
//!
//! # Parse and resolve without touching any durable store
//! strand ingest enwiki-latest-pages-articles.xml.bz2 --dry-run
//!
//! # Inspect what was loaded
//! strand show "Rust (programming language)" --limit 20
//! ```

pub mod account;
pub mod articles;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod decompress;
pub mod explore;
pub mod graph;
pub mod links;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod server;
pub mod stats;
pub mod store;
