use crate::checkpoint::CheckpointStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected during an ingestion run
#[derive(Default)]
pub struct IngestStats {
    pub chunks_committed: AtomicU64,
    pub links_extracted: AtomicU64,
    pub articles_created: AtomicU64,
    pub articles_recovered: AtomicU64,
    pub links_created: AtomicU64,
    pub links_skipped: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_chunks(&self) {
        self.chunks_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_links_extracted(&self, count: u64) {
        self.links_extracted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_articles_created(&self, count: u64) {
        self.articles_created.fetch_add(count, Ordering::Relaxed);
    }

    /// Names found in the durable store instead of being created again
    pub fn add_articles_recovered(&self, count: u64) {
        self.articles_recovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_links_created(&self, count: u64) {
        self.links_created.fetch_add(count, Ordering::Relaxed);
    }

    /// Links not re-committed because their chunk was already committed before a resume
    pub fn add_links_skipped(&self, count: u64) {
        self.links_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn chunks(&self) -> u64 {
        self.chunks_committed.load(Ordering::Relaxed)
    }

    pub fn links_extracted(&self) -> u64 {
        self.links_extracted.load(Ordering::Relaxed)
    }

    pub fn articles_created(&self) -> u64 {
        self.articles_created.load(Ordering::Relaxed)
    }

    pub fn articles_recovered(&self) -> u64 {
        self.articles_recovered.load(Ordering::Relaxed)
    }

    pub fn links_created(&self) -> u64 {
        self.links_created.load(Ordering::Relaxed)
    }

    pub fn links_skipped(&self) -> u64 {
        self.links_skipped.load(Ordering::Relaxed)
    }

    /// Create stats initialized from a checkpoint
    pub fn from_checkpoint(cp: &CheckpointStats) -> Self {
        Self {
            chunks_committed: AtomicU64::new(cp.chunks_committed),
            links_extracted: AtomicU64::new(cp.links_extracted),
            articles_created: AtomicU64::new(cp.articles_created),
            articles_recovered: AtomicU64::new(cp.articles_recovered),
            links_created: AtomicU64::new(cp.links_created),
            links_skipped: AtomicU64::new(0),
        }
    }

    /// Convert to checkpoint stats for persistence
    pub fn to_checkpoint(&self) -> CheckpointStats {
        CheckpointStats {
            chunks_committed: self.chunks(),
            links_extracted: self.links_extracted(),
            articles_created: self.articles_created(),
            articles_recovered: self.articles_recovered(),
            links_created: self.links_created(),
        }
    }
}
