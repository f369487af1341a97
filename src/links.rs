use crate::articles::ArticleCache;
use crate::config::{LINK_RELATION, LINK_WEIGHT};
use crate::graph::GraphStore;
use crate::models::{EdgeKey, LinkPair};
use anyhow::{Context, Result};

/// Commits every pair in `chunk` as a `link` edge, in one graph-store transaction.
///
/// Runs after [`insert_articles`](crate::articles::insert_articles) for the same
/// chunk, so every endpoint must already be cached; a miss is a bug, not bad input.
pub async fn insert_links<G: GraphStore>(
    graph: &G,
    cache: &ArticleCache,
    chunk: &[LinkPair],
) -> Result<usize> {
    if chunk.is_empty() {
        return Ok(0);
    }

    let lookup = |name: &str| {
        cache.get(name).with_context(|| {
            format!("Internal invariant violated: article {name:?} has no identifier")
        })
    };

    let edges = chunk
        .iter()
        .map(|pair| {
            Ok(EdgeKey::new(
                lookup(&pair.source)?,
                LINK_RELATION,
                lookup(&pair.target)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    graph.create_edges(&edges, LINK_WEIGHT).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;

    async fn cached(graph: &MemoryGraph, names: &[&str]) -> ArticleCache {
        let ids = graph.create_vertices("article", names.len()).await.unwrap();
        let mut cache = ArticleCache::new();
        cache.extend(names.iter().map(|n| n.to_string()).zip(ids));
        cache
    }

    #[tokio::test]
    async fn one_edge_per_pair_with_default_weight() {
        let graph = MemoryGraph::new();
        let cache = cached(&graph, &["A", "B"]).await;
        let chunk = vec![
            LinkPair::new("A", "B"),
            LinkPair::new("A", "B"),
            LinkPair::new("B", "A"),
        ];

        assert_eq!(insert_links(&graph, &cache, &chunk).await.unwrap(), 3);
        let edges = graph.edges();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| e.relation == "link" && e.weight == 1.0));
        assert_eq!(edges[2].outbound_id, cache.get("B").unwrap());
        assert_eq!(graph.edge_calls(), 1);
    }

    #[tokio::test]
    async fn uncached_endpoint_is_an_invariant_violation() {
        let graph = MemoryGraph::new();
        let cache = cached(&graph, &["A"]).await;
        let chunk = vec![LinkPair::new("A", "Ghost")];

        let err = insert_links(&graph, &cache, &chunk).await.unwrap_err();
        assert!(err.to_string().contains("Ghost"));
        assert_eq!(graph.edge_calls(), 0);
    }

    #[tokio::test]
    async fn empty_chunk_skips_the_store() {
        let graph = MemoryGraph::new();
        let cache = ArticleCache::new();
        assert_eq!(insert_links(&graph, &cache, &[]).await.unwrap(), 0);
        assert_eq!(graph.edge_calls(), 0);
    }
}
