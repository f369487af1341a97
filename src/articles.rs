use crate::config::ARTICLE_VERTEX_TYPE;
use crate::graph::GraphStore;
use crate::models::{ArticleId, LinkPair};
use crate::store::MappingStore;
use anyhow::{bail, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::num::NonZeroUsize;
use tracing::debug;

/// In-process name → identifier map for the lifetime of one run.
#[derive(Default)]
pub struct ArticleCache {
    ids: FxHashMap<String, ArticleId>,
}

impl ArticleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ArticleId> {
        self.ids.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn extend(&mut self, mapping: impl IntoIterator<Item = (String, ArticleId)>) {
        self.ids.extend(mapping);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// Vertices allocated in the graph store for this chunk
    pub created: usize,
    /// Names that were already in the durable store from an earlier run
    pub recovered: usize,
}

/// Distinct endpoint names of `chunk` missing from `cache`, in first-seen order.
fn missing_names<'a>(cache: &ArticleCache, chunk: &'a [LinkPair]) -> Vec<&'a str> {
    let mut seen = FxHashSet::default();
    chunk
        .iter()
        .flat_map(|pair| [pair.source.as_str(), pair.target.as_str()])
        .filter(|name| !cache.contains(name) && seen.insert(*name))
        .collect()
}

/// Makes sure every article named in `chunk` has an identifier.
///
/// Names unknown to the cache are first looked up in the durable store, so a
/// name persisted by an earlier run is never created twice. The rest are
/// created in sub-batches of at most `batch_size`: one vertex transaction,
/// then the name metadata, then the durable mapping rows, then the cache.
pub async fn insert_articles<G: GraphStore>(
    graph: &G,
    store: &MappingStore,
    cache: &mut ArticleCache,
    chunk: &[LinkPair],
    batch_size: NonZeroUsize,
) -> Result<ResolveOutcome> {
    let mut new_names = missing_names(cache, chunk);
    if new_names.is_empty() {
        return Ok(ResolveOutcome::default());
    }

    let recovered = store.lookup_article_ids(new_names.iter().copied())?;
    let recovered_count = recovered.len();
    if recovered_count > 0 {
        cache.extend(recovered);
        new_names.retain(|name| !cache.contains(name));
        debug!(count = recovered_count, "Articles recovered from database");
    }

    for batch in new_names.chunks(batch_size.get()) {
        let ids = graph.create_vertices(ARTICLE_VERTEX_TYPE, batch.len()).await?;
        if ids.len() != batch.len() {
            bail!(
                "Graph store returned {} identifiers for {} new articles",
                ids.len(),
                batch.len()
            );
        }

        let mapping: Vec<(String, ArticleId)> = batch
            .iter()
            .map(|name| name.to_string())
            .zip(ids)
            .collect();

        graph.set_names(&mapping).await?;
        store.create_many_articles(&mapping)?;
        cache.extend(mapping);
    }

    Ok(ResolveOutcome {
        created: new_names.len(),
        recovered: recovered_count,
    })
}
