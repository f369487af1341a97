use crate::articles::{insert_articles, ArticleCache};
use crate::batch::BatchExt;
use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::graph::GraphStore;
use crate::links::insert_links;
use crate::parser::{ExtractorConfig, LinkExtractor};
use crate::stats::IngestStats;
use crate::store::MappingStore;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::num::NonZeroUsize;
use std::time::Instant;
use tracing::{debug, info};

pub struct IngestOptions {
    pub input: String,
    pub chunk_size: NonZeroUsize,
    pub article_batch_size: NonZeroUsize,
    pub buffer_size: usize,
    pub extractor: ExtractorConfig,
    pub show_progress: bool,
}

pub struct IngestSummary {
    pub stats: IngestStats,
    pub pages_seen: u64,
    pub pages_skipped: u64,
    /// Chunks whose links were already committed by the run being resumed
    pub chunks_replayed: u64,
}

fn make_spinner(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Streams the archive through extraction, chunking, identity resolution and
/// link commit, one chunk at a time.
///
/// When `resume` is given, the first `resume.chunks_committed` chunks still go
/// through identity resolution (which only recovers names from `store`), but
/// their links are not committed again.
pub async fn run_ingest<G: GraphStore>(
    graph: &G,
    store: &MappingStore,
    options: &IngestOptions,
    resume: Option<&Checkpoint>,
    checkpoint: Option<&CheckpointManager>,
) -> Result<IngestSummary> {
    let mut extractor = LinkExtractor::open_with_window(
        &options.input,
        options.buffer_size,
        options.extractor.clone(),
    )?;

    let replay_until = resume.map_or(0, |cp| cp.chunks_committed);
    let stats = resume.map_or_else(IngestStats::new, |cp| IngestStats::from_checkpoint(&cp.stats));

    let mut cache = ArticleCache::new();
    let pb = make_spinner(options.show_progress);
    let start = Instant::now();
    let mut chunks_replayed = 0u64;

    for (index, chunk) in (&mut extractor).batches(options.chunk_size).enumerate() {
        let chunk = chunk.with_context(|| format!("Failed to extract chunk {}", index))?;
        let index = index as u64;

        let outcome = insert_articles(
            graph,
            store,
            &mut cache,
            &chunk,
            options.article_batch_size,
        )
        .await
        .with_context(|| format!("Failed to resolve articles for chunk {}", index))?;
        stats.add_articles_created(outcome.created as u64);

        if index < replay_until {
            chunks_replayed += 1;
            stats.add_links_skipped(chunk.len() as u64);
            debug!(chunk = index, links = chunk.len(), "Chunk already committed, skipping links");
            pb.set_message(format!("replaying committed chunk {}", index + 1));
            continue;
        }

        stats.add_articles_recovered(outcome.recovered as u64);
        stats.add_links_extracted(chunk.len() as u64);

        let created = insert_links(graph, &cache, &chunk)
            .await
            .with_context(|| format!("Failed to commit links for chunk {}", index))?;
        stats.add_links_created(created as u64);
        stats.inc_chunks();

        info!(
            chunk = index,
            articles = outcome.created,
            links = created,
            "{} articles inserted, {} links inserted",
            outcome.created,
            created
        );
        pb.set_message(format!(
            "chunk {}: {} articles, {} links (total {} articles, {} links)",
            index + 1,
            outcome.created,
            created,
            stats.articles_created(),
            stats.links_created()
        ));

        if let Some(mgr) = checkpoint {
            mgr.maybe_save(index + 1, &stats)?;
        }
    }

    pb.finish_and_clear();

    if let Some(mgr) = checkpoint {
        mgr.clear()?;
    }

    info!(
        duration_secs = start.elapsed().as_secs_f64(),
        chunks = stats.chunks(),
        articles = cache.len(),
        "Ingestion complete"
    );

    Ok(IngestSummary {
        pages_seen: extractor.pages_seen(),
        pages_skipped: extractor.pages_skipped(),
        chunks_replayed,
        stats,
    })
}
