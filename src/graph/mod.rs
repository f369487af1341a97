//! Graph store contract and its backends.
//!
//! The ingestion pipeline only needs batched vertex and edge creation inside
//! one transaction each, plus a side-channel for attaching article names to
//! vertices. The read operations back `strand show`.

mod memory;
mod neo4j;

pub use memory::MemoryGraph;
pub use neo4j::{Neo4jConfig, Neo4jGraph};

use crate::models::{ArticleId, Edge, EdgeKey, Vertex};
use anyhow::{bail, Result};
use rustc_hash::FxHashMap;

#[allow(async_fn_in_trait)]
pub trait GraphStore {
    /// Creates `count` vertices in one transaction. Identifiers come back in
    /// the order the vertices were requested.
    async fn create_vertices(&self, vertex_type: &str, count: usize) -> Result<Vec<ArticleId>>;

    /// Attaches the article name to each vertex. Not atomic with creation.
    async fn set_names(&self, named: &[(String, ArticleId)]) -> Result<()>;

    async fn get_names(&self, ids: &[ArticleId]) -> Result<FxHashMap<ArticleId, String>>;

    /// Creates one edge per key in one transaction and returns how many were created.
    async fn create_edges(&self, edges: &[EdgeKey], weight: f64) -> Result<usize>;

    async fn get_vertex(&self, id: ArticleId) -> Result<Option<Vertex>>;

    async fn get_edge_count(&self, id: ArticleId, relation: &str) -> Result<u64>;

    async fn get_edges(&self, id: ArticleId, relation: &str, limit: usize) -> Result<Vec<Edge>>;
}

/// Vertex types and relations are spliced into queries, so they must be plain identifiers.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        bail!("Invalid {kind} name: {value:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_accept_plain_names() {
        assert!(validate_identifier("relation", "link").is_ok());
        assert!(validate_identifier("vertex type", "_article_2").is_ok());
    }

    #[test]
    fn identifiers_reject_injection() {
        assert!(validate_identifier("relation", "").is_err());
        assert!(validate_identifier("relation", "2link").is_err());
        assert!(validate_identifier("relation", "link`]->() DETACH DELETE").is_err());
        assert!(validate_identifier("relation", "has space").is_err());
    }
}
