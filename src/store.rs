use crate::models::{ArticleId, Credentials};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = include_str!("schema.sql");

/// Durable name → identifier table plus the graph-store credentials.
pub struct MappingStore {
    conn: Connection,
}

impl MappingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to configure database")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self { conn })
    }

    pub fn apply_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to apply database schema")
    }

    /// Replaces the single stored account.
    pub fn set_account_credentials(&self, credentials: &Credentials) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM accounts", [])?;
        tx.execute(
            "INSERT INTO accounts (id, secret) VALUES (?1, ?2)",
            params![credentials.id, credentials.secret],
        )?;
        tx.commit().context("Failed to store account credentials")?;
        Ok(())
    }

    pub fn get_account_credentials(&self) -> Result<Option<Credentials>> {
        self.conn
            .query_row("SELECT id, secret FROM accounts LIMIT 1", [], |row| {
                Ok(Credentials {
                    id: row.get(0)?,
                    secret: row.get(1)?,
                })
            })
            .optional()
            .context("Failed to read account credentials")
    }

    pub fn get_article_id(&self, name: &str) -> Result<Option<ArticleId>> {
        self.conn
            .prepare_cached("SELECT id FROM articles WHERE name = ?1")?
            .query_row(params![name], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to look up article: {name}"))
    }

    pub fn get_article_name(&self, id: ArticleId) -> Result<Option<String>> {
        self.conn
            .prepare_cached("SELECT name FROM articles WHERE id = ?1")?
            .query_row(params![id], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to look up article id: {id}"))
    }

    /// Returns the subset of `names` already persisted, with their identifiers.
    pub fn lookup_article_ids<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<(String, ArticleId)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM articles WHERE name = ?1")?;
        let mut found = Vec::new();
        for name in names {
            if let Some(id) = stmt
                .query_row(params![name], |row| row.get::<_, ArticleId>(0))
                .optional()?
            {
                found.push((name.to_string(), id));
            }
        }
        Ok(found)
    }

    /// Inserts all pairs in one transaction; either every row lands or none does.
    pub fn create_many_articles(&self, articles: &[(String, ArticleId)]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached("INSERT INTO articles (name, id) VALUES (?1, ?2)")?;
            for (name, id) in articles {
                count += stmt
                    .execute(params![name, id])
                    .with_context(|| format!("Failed to record article {name:?} -> {id}"))?;
            }
        }
        tx.commit().context("Failed to commit article mappings")?;
        debug!(count, "Article mappings persisted");
        Ok(count)
    }

    pub fn article_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
