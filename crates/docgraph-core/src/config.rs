use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocGraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphBackend {
    Neo4j,
    Memory,
}

impl std::str::FromStr for GraphBackend {
    type Err = DocGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "neo4j" | "bolt" => Ok(GraphBackend::Neo4j),
            "memory" | "mem" | "in-memory" => Ok(GraphBackend::Memory),
            other => Err(DocGraphError::Config(format!("Unknown graph backend: {other}"))),
        }
    }
}

/// Knobs for one ingestion run: chunking, worker pool, retries, timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub store_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            max_concurrency: 8,
            max_retries: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            store_timeout_secs: 5,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chunk_size: env_parse("CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            chunk_overlap: env_parse("CHUNK_OVERLAP").unwrap_or(defaults.chunk_overlap),
            max_concurrency: env_parse("INGEST_CONCURRENCY")
                .or_else(|| env_parse("NEO4J_MAX_CONNECTIONS"))
                .unwrap_or(defaults.max_concurrency),
            max_retries: env_parse("INGEST_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_base_delay_ms: env_parse("INGEST_RETRY_BASE_MS")
                .unwrap_or(defaults.retry_base_delay_ms),
            retry_max_delay_ms: env_parse("INGEST_RETRY_MAX_MS")
                .unwrap_or(defaults.retry_max_delay_ms),
            store_timeout_secs: env_parse("STORE_TIMEOUT_SECS")
                .unwrap_or(defaults.store_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;
        validate_concurrency(self.max_concurrency)?;
        if self.store_timeout_secs == 0 {
            return Err(DocGraphError::Config("store_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Rejects chunking parameters that can never make progress.
pub fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(DocGraphError::Config("chunk_size must be > 0".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(DocGraphError::Config(format!(
            "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// A worker pool needs at least one slot.
pub fn validate_concurrency(max_concurrency: usize) -> Result<()> {
    if max_concurrency == 0 {
        return Err(DocGraphError::Config("max_concurrency must be > 0".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub graph_backend: GraphBackend,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_max_connections: usize,
    pub server_host: String,
    pub server_port: u16,
    pub ingest: IngestConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let graph_backend = match std::env::var("GRAPH_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => GraphBackend::Neo4j,
        };

        let config = Self {
            graph_backend,
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".into()),
            neo4j_user: std::env::var("NEO4J_USERNAME")
                .or_else(|_| std::env::var("NEO4J_USER"))
                .unwrap_or_else(|_| "neo4j".into()),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "neo4j".into()),
            neo4j_max_connections: env_parse("NEO4J_MAX_CONNECTIONS").unwrap_or(8),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: env_parse("SERVER_PORT").unwrap_or(8080),
            ingest: IngestConfig::from_env(),
        };

        config.ingest.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}
