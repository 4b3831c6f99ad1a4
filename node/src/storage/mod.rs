//! Storage bootstrap, row types and queries.

use crate::{
    chain::{ChainBlock, DeployInfo, FetchError},
    classify::{DeployData, DeployKind},
};
use eyre::{eyre, Result, WrapErr};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::{collections::HashSet, path::Path};
use tracing::info;

const SCHEMA_VERSION: u64 = 1;
const META_SCHEMA_VERSION_KEY: &str = "schema_version";
/// Bound on host parameters per `IN (...)` query.
const QUERY_CHUNK: usize = 500;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS blocks (
        hash        TEXT PRIMARY KEY NOT NULL,
        era         INTEGER NOT NULL,
        timestamp   TEXT NOT NULL,
        height      INTEGER NOT NULL,
        era_end     INTEGER NOT NULL,
        validated   INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS blocks_height ON blocks (height);
    CREATE INDEX IF NOT EXISTS blocks_validated ON blocks (validated);

    CREATE TABLE IF NOT EXISTS deploys (
        hash        TEXT PRIMARY KEY NOT NULL,
        "from"      TEXT NOT NULL,
        cost        TEXT NOT NULL,
        result      INTEGER NOT NULL,
        timestamp   TEXT NOT NULL,
        block       TEXT NOT NULL REFERENCES blocks (hash),
        type        TEXT NOT NULL,
        data        TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS deploys_block ON deploys (block);
    CREATE INDEX IF NOT EXISTS deploys_from ON deploys ("from");

    CREATE VIEW IF NOT EXISTS full_stats AS
        SELECT date(timestamp) AS day, type, COUNT(*) AS count
        FROM deploys
        WHERE julianday(timestamp) >= julianday('now', '-14 days')
        GROUP BY day, type
        ORDER BY day, type;
"#;

const BLOCK_COLUMNS: &str = "hash, era, timestamp, height, era_end, validated";

/// Persisted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub hash: String,
    pub era: u64,
    pub timestamp: String,
    pub height: u64,
    pub era_end: bool,
    /// Every deploy and transfer of the block is stored.
    pub validated: bool,
}

impl BlockRow {
    pub fn from_chain(block: &ChainBlock, validated: bool) -> Self {
        Self {
            hash: block.hash.clone(),
            era: block.header.era_id,
            timestamp: block.header.timestamp.clone(),
            height: block.height(),
            era_end: block.is_era_end(),
            validated,
        }
    }

    fn from_sql(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hash: row.get(0)?,
            era: row.get::<_, i64>(1)? as u64,
            timestamp: row.get(2)?,
            height: row.get::<_, i64>(3)? as u64,
            era_end: row.get(4)?,
            validated: row.get(5)?,
        })
    }
}

/// Persisted deploy with its classified payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRow {
    pub hash: String,
    pub from: String,
    pub cost: String,
    pub result: bool,
    pub timestamp: String,
    pub block: String,
    pub data: DeployData,
}

impl DeployRow {
    /// Builds a row from a fetched deploy; fails when the deploy has not executed yet.
    pub fn from_chain(
        info: &DeployInfo,
        block_hash: &str,
        data: DeployData,
    ) -> Result<Self, FetchError> {
        let execution = info.execution()?;
        Ok(Self {
            hash: info.deploy.hash.clone(),
            from: info.deploy.header.account.clone(),
            cost: execution.cost().to_string(),
            result: execution.is_success(),
            timestamp: info.deploy.header.timestamp.clone(),
            block: block_hash.to_string(),
            data,
        })
    }

    pub fn kind(&self) -> DeployKind {
        self.data.kind()
    }
}

/// Deploy count for one type on one day, from the `full_stats` view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployStat {
    pub day: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub blocks: u64,
    pub validated_blocks: u64,
    pub deploys: u64,
}

/// Relational store consumed by the sync engines.
pub trait Store: Send + Sync {
    /// Insert or update by hash; every non-key column is overwritten.
    fn upsert_blocks(&self, rows: &[BlockRow]) -> Result<()>;
    /// Insert or update by hash; every non-key column is overwritten.
    fn upsert_deploys(&self, rows: &[DeployRow]) -> Result<()>;
    /// Number of distinct `hashes` present as deploy rows.
    fn count_deploys_by_hashes(&self, hashes: &[String]) -> Result<usize>;
    /// Subset of `hashes` present as deploy rows.
    fn existing_deploy_hashes(&self, hashes: &[String]) -> Result<HashSet<String>>;
    fn find_block_by_height(&self, height: u64) -> Result<Option<BlockRow>>;
    fn find_unvalidated_blocks(&self) -> Result<Vec<BlockRow>>;
    fn find_max_height_block(&self) -> Result<Option<BlockRow>>;
    /// Heights between the lowest and highest stored block with no row, ascending.
    fn find_missing_heights(&self) -> Result<Vec<u64>>;
}

/// SQLite-backed [`Store`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("failed to open database {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.bootstrap()?;
        info!(db_path = %path.display(), "storage ready");
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().wrap_err("failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
            (),
        )
        .wrap_err("failed to create meta table")?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [META_SCHEMA_VERSION_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            None => {
                conn.execute_batch(SCHEMA)
                    .wrap_err("failed to create schema")?;
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                    params![META_SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_string()],
                )?;
                info!(schema_version = SCHEMA_VERSION, "initialized storage schema");
            }
            Some(value) => {
                let schema_version: u64 = value
                    .parse()
                    .wrap_err_with(|| format!("invalid schema version {value:?}"))?;
                if schema_version != SCHEMA_VERSION {
                    return Err(eyre!(
                        "unsupported schema version {schema_version} (expected {SCHEMA_VERSION})"
                    ));
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn block_by_hash(&self, hash: &str) -> Result<Option<BlockRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE hash = ?1"),
                [hash],
                BlockRow::from_sql,
            )
            .optional()?;
        Ok(row)
    }

    #[cfg(test)]
    pub fn deploy_by_hash(&self, hash: &str) -> Result<Option<DeployRow>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                r#"SELECT hash, "from", cost, result, timestamp, block, type, data
                   FROM deploys WHERE hash = ?1"#,
                [hash],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;
        let Some((hash, from, cost, result, timestamp, block, kind, data)) = raw else {
            return Ok(None);
        };
        let kind: DeployKind = kind.parse()?;
        let data = DeployData::from_stored(kind, &data)
            .wrap_err_with(|| format!("invalid payload for deploy {hash}"))?;
        Ok(Some(DeployRow {
            hash,
            from,
            cost,
            result,
            timestamp,
            block,
            data,
        }))
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn.lock();
        let (blocks, validated_blocks) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(validated), 0) FROM blocks",
            (),
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        let deploys: i64 = conn.query_row("SELECT COUNT(*) FROM deploys", (), |row| row.get(0))?;
        Ok(StoreCounts {
            blocks: blocks as u64,
            validated_blocks: validated_blocks as u64,
            deploys: deploys as u64,
        })
    }

    /// Rows of the `full_stats` view.
    pub fn deploy_stats(&self) -> Result<Vec<DeployStat>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT day, type, count FROM full_stats")?;
        let stats = stmt
            .query_map((), |row| {
                Ok(DeployStat {
                    day: row.get(0)?,
                    kind: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    fn query_blocks(&self, sql: &str) -> Result<Vec<BlockRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map((), BlockRow::from_sql)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl Store for SqliteStore {
    fn upsert_blocks(&self, rows: &[BlockRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"INSERT INTO blocks (hash, era, timestamp, height, era_end, validated)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(hash) DO UPDATE SET
                       era = excluded.era,
                       timestamp = excluded.timestamp,
                       height = excluded.height,
                       era_end = excluded.era_end,
                       validated = excluded.validated"#,
            )?;
            for row in rows {
                stmt.execute(params![
                    row.hash,
                    row.era as i64,
                    row.timestamp,
                    row.height as i64,
                    row.era_end,
                    row.validated,
                ])
                .wrap_err_with(|| format!("failed to upsert block {}", row.hash))?;
            }
        }
        tx.commit().wrap_err("failed to commit block batch")?;
        Ok(())
    }

    fn upsert_deploys(&self, rows: &[DeployRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"INSERT INTO deploys (hash, "from", cost, result, timestamp, block, type, data)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                   ON CONFLICT(hash) DO UPDATE SET
                       "from" = excluded."from",
                       cost = excluded.cost,
                       result = excluded.result,
                       timestamp = excluded.timestamp,
                       block = excluded.block,
                       type = excluded.type,
                       data = excluded.data"#,
            )?;
            for row in rows {
                stmt.execute(params![
                    row.hash,
                    row.from,
                    row.cost,
                    row.result,
                    row.timestamp,
                    row.block,
                    row.kind().as_str(),
                    row.data.to_json()?,
                ])
                .wrap_err_with(|| format!("failed to upsert deploy {}", row.hash))?;
            }
        }
        tx.commit().wrap_err("failed to commit deploy batch")?;
        Ok(())
    }

    fn count_deploys_by_hashes(&self, hashes: &[String]) -> Result<usize> {
        Ok(self.existing_deploy_hashes(hashes)?.len())
    }

    fn existing_deploy_hashes(&self, hashes: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        if hashes.is_empty() {
            return Ok(found);
        }
        let conn = self.conn.lock();
        for chunk in hashes.chunks(QUERY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT hash FROM deploys WHERE hash IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get(0))?;
            for hash in rows {
                found.insert(hash?);
            }
        }
        Ok(found)
    }

    fn find_block_by_height(&self, height: u64) -> Result<Option<BlockRow>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE height = ?1 LIMIT 1"),
                [height as i64],
                BlockRow::from_sql,
            )
            .optional()?;
        Ok(row)
    }

    fn find_unvalidated_blocks(&self) -> Result<Vec<BlockRow>> {
        self.query_blocks(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE validated = 0 ORDER BY height"
        ))
    }

    fn find_max_height_block(&self) -> Result<Option<BlockRow>> {
        Ok(self
            .query_blocks(&format!(
                "SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY height DESC LIMIT 1"
            ))?
            .pop())
    }

    fn find_missing_heights(&self) -> Result<Vec<u64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT previous + 1, height - 1 FROM (
                   SELECT height, LAG(height) OVER (ORDER BY height) AS previous
                   FROM (SELECT DISTINCT height FROM blocks)
               )
               WHERE height - previous > 1
               ORDER BY height"#,
        )?;
        let gaps = stmt
            .query_map((), |row| {
                Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(expand_gaps(&gaps))
    }
}

/// Flattens inclusive `(first, last)` ranges into individual heights.
fn expand_gaps(gaps: &[(u64, u64)]) -> Vec<u64> {
    gaps.iter().flat_map(|&(first, last)| first..=last).collect()
}
