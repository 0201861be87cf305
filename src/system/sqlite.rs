use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{BackendError, ConstructionError};
use crate::model::{Metadata, RetrievedChunk, SystemConfig};
use crate::semantic::{
    DEFAULT_EMBEDDING_DIM, content_hash, cosine_similarity, decode_embedding_blob,
    embed_text_local, encode_embedding_blob, tokenize_words,
};
use crate::util::now_utc_string;

use super::{System, component, optional_str, optional_u64, required_str};

const INDEX_SCHEMA_VERSION: &str = "1";
const MAX_CANDIDATES: usize = 256;
const DEFAULT_RRF_K: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteMode {
    Lexical,
    Semantic,
    Hybrid,
}

impl SqliteMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "lexical" => Some(Self::Lexical),
            "semantic" => Some(Self::Semantic),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    chunk_id: String,
    content: String,
    metadata_json: String,
    score: f64,
    lexical_rank: Option<usize>,
    semantic_rank: Option<usize>,
}

/// Local chunk index built by `rageval index`: FTS5 for lexical search, hashed embeddings for
/// semantic search, reciprocal-rank fusion for hybrid.
#[derive(Debug)]
pub struct SqliteSystem {
    db_path: PathBuf,
    mode: SqliteMode,
    rrf_k: u32,
    embedding_dim: usize,
}

impl SqliteSystem {
    pub fn from_config(config: &SystemConfig) -> Result<Self, ConstructionError> {
        let db_path = PathBuf::from(required_str(config, "db_path")?);
        let mode_raw = optional_str(config, "mode", "lexical");
        let mode = SqliteMode::parse(mode_raw).ok_or_else(|| {
            ConstructionError::new(
                component(config),
                format!("unknown mode '{mode_raw}' (expected lexical, semantic or hybrid)"),
            )
        })?;
        let rrf_k = optional_u64(config, "rrf_k", DEFAULT_RRF_K)
            .clamp(1, u64::from(u32::MAX)) as u32;

        let connection = open_read_only(&db_path).map_err(|err| {
            ConstructionError::new(component(config), format!("{}: {err}", db_path.display()))
        })?;
        let stored_dim = read_index_metadata(&connection, "embedding_dim")
            .map_err(|err| ConstructionError::new(component(config), err.to_string()))?
            .and_then(|value| value.parse::<usize>().ok());
        let Some(embedding_dim) = stored_dim else {
            return Err(ConstructionError::new(
                component(config),
                format!(
                    "{} is not a rageval index; build it with `rageval index`",
                    db_path.display()
                ),
            ));
        };

        let configured_dim = config.config.get("embedding_dim").and_then(Value::as_u64);
        if let Some(configured_dim) = configured_dim {
            if configured_dim != embedding_dim as u64 {
                return Err(ConstructionError::new(
                    component(config),
                    format!(
                        "embedding_dim {configured_dim} does not match the index \
                         ({embedding_dim}); rebuild it with `rageval index --embedding-dim`"
                    ),
                ));
            }
        }

        Ok(Self {
            db_path,
            mode,
            rrf_k,
            embedding_dim,
        })
    }

    fn lexical_candidates(
        &self,
        connection: &Connection,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let Some(match_expression) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };

        let mut statement = connection.prepare(
            "
            SELECT c.chunk_id, c.content, c.metadata_json, bm25(chunks_fts) AS bm25_score
            FROM chunks_fts
            JOIN chunks c ON c.chunk_id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ?1
            ORDER BY bm25_score
            LIMIT ?2
            ",
        )?;
        let mut rows = statement.query(params![match_expression, limit as i64])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let bm25: f64 = row.get(3)?;
            out.push(Candidate {
                chunk_id: row.get(0)?,
                content: row.get(1)?,
                metadata_json: row.get(2)?,
                score: -bm25,
                lexical_rank: Some(out.len() + 1),
                semantic_rank: None,
            });
        }
        Ok(out)
    }

    fn semantic_candidates(
        &self,
        connection: &Connection,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, BackendError> {
        let query_embedding = embed_text_local(query, self.embedding_dim);
        let mut statement =
            connection.prepare("SELECT chunk_id, content, metadata_json, embedding FROM chunks")?;
        let mut rows = statement.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let blob: Vec<u8> = row.get(3)?;
            let Some(embedding) = decode_embedding_blob(&blob, self.embedding_dim) else {
                continue;
            };
            out.push(Candidate {
                chunk_id: row.get(0)?,
                content: row.get(1)?,
                metadata_json: row.get(2)?,
                score: cosine_similarity(&query_embedding, &embedding),
                lexical_rank: None,
                semantic_rank: None,
            });
        }

        sort_candidates(&mut out);
        out.truncate(limit);
        for (index, candidate) in out.iter_mut().enumerate() {
            candidate.semantic_rank = Some(index + 1);
        }
        Ok(out)
    }

    fn to_chunk(&self, candidate: Candidate) -> RetrievedChunk {
        let mut metadata = serde_json::from_str::<Metadata>(&candidate.metadata_json)
            .unwrap_or_default();
        metadata.insert("chunk_id".to_string(), Value::from(candidate.chunk_id));
        if let Some(rank) = candidate.lexical_rank {
            metadata.insert("lexical_rank".to_string(), Value::from(rank as u64));
        }
        if let Some(rank) = candidate.semantic_rank {
            metadata.insert("semantic_rank".to_string(), Value::from(rank as u64));
        }
        RetrievedChunk {
            content: candidate.content,
            score: Some(candidate.score),
            metadata,
        }
    }
}

impl System for SqliteSystem {
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, BackendError> {
        let connection = open_read_only(&self.db_path)?;
        let candidate_limit = top_k
            .saturating_mul(4)
            .clamp(top_k.max(1), MAX_CANDIDATES.max(top_k));

        let mut candidates = match self.mode {
            SqliteMode::Lexical => self.lexical_candidates(&connection, query, top_k)?,
            SqliteMode::Semantic => self.semantic_candidates(&connection, query, top_k)?,
            SqliteMode::Hybrid => fuse_rrf(
                &self.lexical_candidates(&connection, query, candidate_limit)?,
                &self.semantic_candidates(&connection, query, candidate_limit)?,
                self.rrf_k,
            ),
        };
        candidates.truncate(top_k);

        Ok(candidates
            .into_iter()
            .map(|candidate| self.to_chunk(candidate))
            .collect())
    }
}

fn open_read_only(db_path: &Path) -> Result<Connection, BackendError> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(BackendError::from)
}

fn read_index_metadata(connection: &Connection, key: &str) -> Result<Option<String>, BackendError> {
    let table_exists = connection
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'index_metadata'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .is_some();
    if !table_exists {
        return Ok(None);
    }

    Ok(connection
        .query_row(
            "SELECT value FROM index_metadata WHERE key = ?1",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

/// Quotes every word so user text can never be read as FTS5 syntax; words are OR-ed.
fn fts_match_expression(query: &str) -> Option<String> {
    let words = tokenize_words(query);
    if words.is_empty() {
        return None;
    }
    Some(
        words
            .iter()
            .map(|word| format!("\"{word}\""))
            .collect::<Vec<String>>()
            .join(" OR "),
    )
}

fn fuse_rrf(lexical: &[Candidate], semantic: &[Candidate], rrf_k: u32) -> Vec<Candidate> {
    let rrf_base = f64::from(rrf_k.max(1));
    let mut merged = HashMap::<String, Candidate>::new();

    for (index, candidate) in lexical.iter().enumerate() {
        let rank = candidate.lexical_rank.unwrap_or(index + 1);
        let entry = merged
            .entry(candidate.chunk_id.clone())
            .or_insert_with(|| seed_fusion_candidate(candidate));
        entry.score += 1.0 / (rrf_base + rank as f64);
        entry.lexical_rank = Some(rank);
    }

    for (index, candidate) in semantic.iter().enumerate() {
        let rank = candidate.semantic_rank.unwrap_or(index + 1);
        let entry = merged
            .entry(candidate.chunk_id.clone())
            .or_insert_with(|| seed_fusion_candidate(candidate));
        entry.score += 1.0 / (rrf_base + rank as f64);
        entry.semantic_rank = Some(rank);
    }

    let mut out = merged.into_values().collect::<Vec<Candidate>>();
    sort_candidates(&mut out);
    out
}

fn seed_fusion_candidate(candidate: &Candidate) -> Candidate {
    let mut seeded = candidate.clone();
    seeded.score = 0.0;
    seeded.lexical_rank = None;
    seeded.semantic_rank = None;
    seeded
}

fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then(left.chunk_id.cmp(&right.chunk_id))
    });
}

#[derive(Debug, Deserialize)]
struct IndexInputRow {
    #[serde(default)]
    id: Option<String>,
    content: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub db_path: String,
    pub chunks_indexed: usize,
    pub skipped_empty: usize,
    pub embedding_dim: usize,
    pub built_at: String,
}

/// Rebuilds the chunk index at `db_path` from a JSONL file of `{id, content, metadata}` rows.
pub fn build_index(
    db_path: &Path,
    input_path: &Path,
    embedding_dim: Option<usize>,
) -> Result<IndexStats> {
    let embedding_dim = embedding_dim.unwrap_or(DEFAULT_EMBEDDING_DIM);
    if embedding_dim == 0 {
        bail!("embedding dimension must be positive");
    }

    let input = File::open(input_path)
        .with_context(|| format!("failed to open index input {}", input_path.display()))?;
    let mut connection = Connection::open(db_path)
        .with_context(|| format!("failed to open index database {}", db_path.display()))?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    recreate_schema(&connection)?;

    let built_at = now_utc_string();
    let mut chunks_indexed = 0usize;
    let mut skipped_empty = 0usize;

    let tx = connection.transaction().context("failed to start index transaction")?;
    {
        let mut insert_chunk = tx.prepare(
            "
            INSERT INTO chunks (chunk_id, content, metadata_json, content_hash, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )?;
        let mut insert_fts =
            tx.prepare("INSERT INTO chunks_fts (chunk_id, content) VALUES (?1, ?2)")?;

        for (line_number, line) in BufReader::new(input).lines().enumerate() {
            let line = line.with_context(|| {
                format!("failed to read {} line {}", input_path.display(), line_number + 1)
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let row: IndexInputRow = serde_json::from_str(&line).with_context(|| {
                format!("failed to parse {} line {}", input_path.display(), line_number + 1)
            })?;
            if row.content.trim().is_empty() {
                skipped_empty += 1;
                continue;
            }

            let chunk_id = row
                .id
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| format!("chunk-{}", line_number + 1));
            let metadata_json = serde_json::to_string(&row.metadata)
                .context("failed to serialize chunk metadata")?;
            let embedding = encode_embedding_blob(&embed_text_local(&row.content, embedding_dim));

            insert_chunk
                .execute(params![
                    chunk_id,
                    row.content,
                    metadata_json,
                    content_hash(&row.content),
                    embedding
                ])
                .with_context(|| format!("failed to insert chunk '{chunk_id}'"))?;
            insert_fts.execute(params![chunk_id, row.content])?;
            chunks_indexed += 1;
        }

        let mut insert_metadata =
            tx.prepare("INSERT INTO index_metadata (key, value) VALUES (?1, ?2)")?;
        insert_metadata.execute(params!["schema_version", INDEX_SCHEMA_VERSION])?;
        insert_metadata.execute(params!["embedding_dim", embedding_dim.to_string()])?;
        insert_metadata.execute(params!["built_at", built_at])?;
    }
    tx.commit().context("failed to commit index")?;

    info!(
        db_path = %db_path.display(),
        chunks_indexed,
        skipped_empty,
        embedding_dim,
        "index built"
    );

    Ok(IndexStats {
        db_path: db_path.display().to_string(),
        chunks_indexed,
        skipped_empty,
        embedding_dim,
        built_at,
    })
}

fn recreate_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            DROP TABLE IF EXISTS chunks_fts;
            DROP TABLE IF EXISTS chunks;
            DROP TABLE IF EXISTS index_metadata;

            CREATE TABLE index_metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE chunks (
              chunk_id TEXT PRIMARY KEY,
              content TEXT NOT NULL,
              metadata_json TEXT NOT NULL DEFAULT '{}',
              content_hash TEXT NOT NULL,
              embedding BLOB NOT NULL
            );

            CREATE VIRTUAL TABLE chunks_fts USING fts5(chunk_id UNINDEXED, content);
            ",
        )
        .context("failed to create index schema")
}
