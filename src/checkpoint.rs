use crate::config::CHECKPOINT_VERSION;
use crate::stats::IngestStats;
use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, warn};

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CheckpointStats {
    pub chunks_committed: u64,
    pub links_extracted: u64,
    pub articles_created: u64,
    pub articles_recovered: u64,
    pub links_created: u64,
}

/// Progress of a run, keyed to the exact archive and chunking it was made with.
///
/// Chunk boundaries only line up across runs when the input and chunk size are
/// unchanged, so either one changing invalidates the checkpoint.
#[derive(Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub input_path: String,
    pub input_mtime: u64,
    pub chunk_size: u64,
    pub chunks_committed: u64,
    pub stats: CheckpointStats,
}

/// The checkpoint lives next to the mapping database it belongs to.
pub fn checkpoint_path(database: &str) -> PathBuf {
    PathBuf::from(format!("{database}.checkpoint"))
}

fn get_input_mtime(input_path: &str) -> Result<u64> {
    let metadata = fs::metadata(input_path)
        .with_context(|| format!("Failed to get metadata for: {}", input_path))?;
    let mtime = metadata
        .modified()
        .context("Failed to get modification time")?
        .duration_since(SystemTime::UNIX_EPOCH)
        .context("Invalid modification time")?
        .as_secs();
    Ok(mtime)
}

/// `persisted_articles` is the row count of the mapping store the run will use.
/// A store holding fewer articles than the checkpoint says were created is not
/// the store the checkpoint was written against.
pub fn load_if_valid(
    input_path: &str,
    database: &str,
    chunk_size: usize,
    persisted_articles: u64,
) -> Result<Option<Checkpoint>> {
    let path = checkpoint_path(database);

    if !path.exists() {
        return Ok(None);
    }

    let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    let file = File::open(&path).context("Failed to open checkpoint file")?;
    let reader = BufReader::new(file);

    let options = bincode::options().with_limit(file_size.saturating_add(1024));

    let checkpoint: Checkpoint = match options.deserialize_from(reader) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Checkpoint file is corrupt or unreadable");
            return Ok(None);
        }
    };

    if checkpoint.version != CHECKPOINT_VERSION {
        info!(
            cached = checkpoint.version,
            current = CHECKPOINT_VERSION,
            "Checkpoint version mismatch"
        );
        return Ok(None);
    }

    if checkpoint.input_path != input_path {
        info!(
            cached = checkpoint.input_path,
            current = input_path,
            "Checkpoint input path mismatch"
        );
        return Ok(None);
    }

    let current_mtime = get_input_mtime(input_path)?;
    if checkpoint.input_mtime != current_mtime {
        info!(
            cached_mtime = checkpoint.input_mtime,
            current_mtime = current_mtime,
            "Input file has changed since checkpoint was created"
        );
        return Ok(None);
    }

    if checkpoint.chunk_size != chunk_size as u64 {
        info!(
            cached = checkpoint.chunk_size,
            current = chunk_size,
            "Checkpoint chunk size mismatch"
        );
        return Ok(None);
    }

    if persisted_articles < checkpoint.stats.articles_created {
        warn!(
            expected_at_least = checkpoint.stats.articles_created,
            found = persisted_articles,
            "Mapping database does not match checkpoint"
        );
        return Ok(None);
    }

    info!(
        chunks = checkpoint.chunks_committed,
        links = checkpoint.stats.links_created,
        "Loaded valid checkpoint"
    );

    Ok(Some(checkpoint))
}

pub fn clear(database: &str) -> Result<()> {
    let path = checkpoint_path(database);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove checkpoint file: {:?}", path))?;
        info!("Checkpoint cleared");
    }
    Ok(())
}

pub struct CheckpointManager {
    checkpoint_path: PathBuf,
    database: String,
    input_path: String,
    input_mtime: u64,
    chunk_size: u64,
    interval: u32,
    chunks_since_save: AtomicU32,
}

impl CheckpointManager {
    pub fn new(input_path: &str, database: &str, chunk_size: usize, interval: u32) -> Result<Self> {
        let input_mtime = get_input_mtime(input_path)?;
        Ok(Self {
            checkpoint_path: checkpoint_path(database),
            database: database.to_string(),
            input_path: input_path.to_string(),
            input_mtime,
            chunk_size: chunk_size as u64,
            interval: interval.max(1),
            chunks_since_save: AtomicU32::new(0),
        })
    }

    /// Saves once every `interval` committed chunks.
    pub fn maybe_save(&self, chunks_committed: u64, stats: &IngestStats) -> Result<bool> {
        let count = self.chunks_since_save.fetch_add(1, Ordering::Relaxed) + 1;
        if count < self.interval {
            return Ok(false);
        }
        self.save(chunks_committed, stats)?;
        self.chunks_since_save.store(0, Ordering::Relaxed);
        Ok(true)
    }

    pub fn save(&self, chunks_committed: u64, stats: &IngestStats) -> Result<()> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            input_path: self.input_path.clone(),
            input_mtime: self.input_mtime,
            chunk_size: self.chunk_size,
            chunks_committed,
            stats: stats.to_checkpoint(),
        };

        if let Some(parent) = self.checkpoint_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        let tmp_path = self.checkpoint_path.with_extension("checkpoint.tmp");
        let file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp checkpoint file: {:?}", tmp_path))?;
        let writer = BufWriter::new(file);

        bincode::DefaultOptions::new()
            .serialize_into(writer, &checkpoint)
            .context("Failed to serialize checkpoint")?;

        fs::rename(&tmp_path, &self.checkpoint_path).with_context(|| {
            format!(
                "Failed to rename temp checkpoint: {:?}",
                self.checkpoint_path
            )
        })?;

        debug!(chunks = chunks_committed, "Checkpoint saved");

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        clear(&self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_input(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("dump.xml.bz2");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "test content").unwrap();
        path
    }

    fn database(dir: &TempDir) -> String {
        dir.path().join("strand.sqlite").to_str().unwrap().to_string()
    }

    #[test]
    fn checkpoint_path_sits_beside_database() {
        let path = checkpoint_path("/data/strand.sqlite");
        assert_eq!(path, PathBuf::from("/data/strand.sqlite.checkpoint"));
    }

    #[test]
    fn load_if_valid_returns_none_when_no_checkpoint() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let result = load_if_valid(input_path.to_str().unwrap(), &database(&dir), 100, 0).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let db = database(&dir);

        let manager = CheckpointManager::new(input_str, &db, 100, 1).unwrap();
        let stats = IngestStats::new();
        stats.inc_chunks();
        stats.add_links_created(100);
        manager.save(1, &stats).unwrap();

        let loaded = load_if_valid(input_str, &db, 100, 0).unwrap().unwrap();
        assert_eq!(loaded.chunks_committed, 1);
        assert_eq!(loaded.stats.links_created, 100);
    }

    #[test]
    fn invalidated_by_chunk_size_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let db = database(&dir);

        let manager = CheckpointManager::new(input_str, &db, 100, 1).unwrap();
        manager.save(3, &IngestStats::new()).unwrap();

        assert!(load_if_valid(input_str, &db, 50, 0).unwrap().is_none());
    }

    #[test]
    fn invalidated_by_input_path_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let db = database(&dir);

        let manager = CheckpointManager::new(input_str, &db, 100, 1).unwrap();
        manager.save(3, &IngestStats::new()).unwrap();

        let other = dir.path().join("other.xml.bz2");
        fs::copy(&input_path, &other).unwrap();
        assert!(load_if_valid(other.to_str().unwrap(), &db, 100, 0).unwrap().is_none());
    }

    #[test]
    fn invalidated_by_input_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let db = database(&dir);

        let manager = CheckpointManager::new(input_str, &db, 100, 1).unwrap();
        manager.save(3, &IngestStats::new()).unwrap();

        // mtime has second granularity
        std::thread::sleep(std::time::Duration::from_secs(1));
        let mut file = File::create(&input_path).unwrap();
        writeln!(file, "modified content").unwrap();

        assert!(load_if_valid(input_str, &db, 100, 0).unwrap().is_none());
    }

    #[test]
    fn maybe_save_respects_interval() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let db = database(&dir);

        let manager = CheckpointManager::new(input_str, &db, 100, 2).unwrap();
        let stats = IngestStats::new();

        assert!(!manager.maybe_save(1, &stats).unwrap());
        assert!(manager.maybe_save(2, &stats).unwrap());
        assert!(!manager.maybe_save(3, &stats).unwrap());
        assert!(manager.maybe_save(4, &stats).unwrap());
        assert_eq!(load_if_valid(input_str, &db, 100, 0).unwrap().unwrap().chunks_committed, 4);
    }

    #[test]
    fn clear_removes_checkpoint() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let db = database(&dir);

        let manager = CheckpointManager::new(input_path.to_str().unwrap(), &db, 100, 1).unwrap();
        manager.save(1, &IngestStats::new()).unwrap();
        assert!(Path::new(&checkpoint_path(&db)).exists());

        manager.clear().unwrap();
        assert!(!checkpoint_path(&db).exists());
    }

    #[test]
    fn invalidated_by_replaced_database() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let db = database(&dir);

        let manager = CheckpointManager::new(input_str, &db, 100, 1).unwrap();
        let stats = IngestStats::new();
        stats.inc_chunks();
        stats.add_articles_created(3);
        manager.save(1, &stats).unwrap();

        assert!(load_if_valid(input_str, &db, 100, 0).unwrap().is_none());
        assert!(load_if_valid(input_str, &db, 100, 2).unwrap().is_none());
        assert!(load_if_valid(input_str, &db, 100, 3).unwrap().is_some());
    }

    #[test]
    fn corrupt_checkpoint_returns_none() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let db = database(&dir);

        let mut file = File::create(checkpoint_path(&db)).unwrap();
        file.write_all(b"not valid bincode").unwrap();

        let result = load_if_valid(input_path.to_str().unwrap(), &db, 100, 0).unwrap();
        assert!(result.is_none());
    }
}
