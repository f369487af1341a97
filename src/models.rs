use serde::Serialize;

/// Identifier the graph store assigns to a vertex
pub type ArticleId = i64;

/// A directed reference from one article body to another, by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkPair {
    pub source: String,
    pub target: String,
}

impl LinkPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub outbound_id: ArticleId,
    pub relation: String,
    pub inbound_id: ArticleId,
}

impl EdgeKey {
    pub fn new(outbound_id: ArticleId, relation: &str, inbound_id: ArticleId) -> Self {
        Self {
            outbound_id,
            relation: relation.to_string(),
            inbound_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vertex {
    pub id: ArticleId,
    pub vertex_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub outbound_id: ArticleId,
    pub relation: String,
    pub inbound_id: ArticleId,
    pub weight: f64,
}

/// Account credentials for the graph store, kept in the `accounts` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub id: String,
    pub secret: String,
}

/// One article as rendered by `strand show`
#[derive(Debug, Serialize)]
pub struct ArticleView {
    pub name: String,
    pub id: ArticleId,
    pub vertex: Option<Vertex>,
    pub link_count: u64,
    pub links: Vec<LinkedArticle>,
}

#[derive(Debug, Serialize)]
pub struct LinkedArticle {
    pub id: ArticleId,
    pub name: Option<String>,
}
