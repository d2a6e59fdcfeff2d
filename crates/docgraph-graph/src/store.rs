use std::collections::BTreeSet;

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};

use docgraph_core::chunk::{Chunk, ChunkRef};
use docgraph_core::config::AppConfig;
use docgraph_core::error::{DocGraphError, Result};
use docgraph_core::graph::{GraphStatistics, GraphStore};

/// Neo4j status-code fragments that no amount of retrying will fix.
const FATAL_CODE_PREFIXES: &[&str] = &[
    "Neo.ClientError.Security.",
    "Neo.ClientError.Schema.",
    "Neo.ClientError.Statement.SyntaxError",
];

/// A merge that lost a race against the uniqueness constraint; retrying matches
/// the node the other writer created.
const CONSTRAINT_RACE_CODE: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT entity_name_unique IF NOT EXISTS \
     FOR (e:Entity) REQUIRE e.name IS UNIQUE",
    "CREATE CONSTRAINT chunk_identity_unique IF NOT EXISTS \
     FOR (c:Chunk) REQUIRE (c.document_id, c.chunk_index) IS UNIQUE",
];

/// `GraphStore` over a Neo4j bolt connection pool.
///
/// `neo4rs::Graph` is itself a pool; every call checks a connection out and
/// returns it when the future completes, error paths included.
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(config.neo4j_uri.as_str())
            .user(config.neo4j_user.as_str())
            .password(config.neo4j_password.as_str())
            .max_connections(config.neo4j_max_connections)
            .build()
            .map_err(|e| DocGraphError::Config(format!("Invalid Neo4j configuration: {e}")))?;

        let graph = Graph::connect(neo4j_config)
            .await
            .map_err(|e| classify("Failed to connect to Neo4j", e))?;

        tracing::info!(
            uri = %config.neo4j_uri,
            max_connections = config.neo4j_max_connections,
            "Connected to Neo4j"
        );

        Ok(Self { graph })
    }

    pub fn from_graph(graph: Graph) -> Self {
        Self { graph }
    }

    async fn count(&self, cypher: &str, what: &str) -> Result<u64> {
        let mut stream = self
            .graph
            .execute(query(cypher))
            .await
            .map_err(|e| classify(&format!("Failed to count {what}"), e))?;

        match stream.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get("cnt")
                    .map_err(|e| DocGraphError::StoreTransient(format!("Failed to get count: {e}")))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(classify(&format!("Error counting {what}"), e)),
        }
    }

    /// Run a write that reports one integer column and return it.
    async fn write_returning(&self, q: Query, column: &str, context: &str) -> Result<i64> {
        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| classify(context, e))?;

        match stream.next().await {
            Ok(Some(row)) => row
                .get(column)
                .map_err(|e| DocGraphError::StoreTransient(format!("{context}: missing {column}: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(classify(context, e)),
        }
    }
}

fn chunk_query(chunk: &Chunk) -> Query {
    query(
        "MERGE (c:Chunk {document_id: $document_id, chunk_index: $chunk_index}) \
         SET c.text = $text \
         WITH c \
         OPTIONAL MATCH (:Entity)-[m:MENTIONS]->(c) \
         DELETE m",
    )
    .param("document_id", chunk.document_id.clone())
    .param("chunk_index", chunk.chunk_index as i64)
    .param("text", chunk.text.clone())
}

/// Entity merge plus its edge to a chunk written earlier in the same
/// transaction.
fn entity_mention_query(name: &str, chunk: &ChunkRef) -> Query {
    query(
        "MERGE (e:Entity {name: $name}) \
         WITH e \
         MATCH (c:Chunk {document_id: $document_id, chunk_index: $chunk_index}) \
         MERGE (e)-[:MENTIONS]->(c)",
    )
    .param("name", name.to_string())
    .param("document_id", chunk.document_id.clone())
    .param("chunk_index", chunk.chunk_index as i64)
}

/// Map a driver error onto the transient/fatal split.
fn classify(context: &str, err: neo4rs::Error) -> DocGraphError {
    let message = format!("{context}: {err}");

    if message.contains(CONSTRAINT_RACE_CODE) {
        return DocGraphError::StoreTransient(message);
    }

    let fatal = matches!(err, neo4rs::Error::AuthenticationError(_))
        || FATAL_CODE_PREFIXES.iter().any(|code| message.contains(code));

    if fatal {
        DocGraphError::StoreFatal(message)
    } else {
        DocGraphError::StoreTransient(message)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            self.graph
                .run(query(statement))
                .await
                .map_err(|e| classify("Failed to create constraint", e))?;
        }
        tracing::info!(constraints = SCHEMA_STATEMENTS.len(), "Neo4j schema ensured");
        Ok(())
    }

    async fn ensure_chunk(&self, chunk: &Chunk) -> Result<ChunkRef> {
        let q = chunk_query(chunk);

        self.graph
            .run(q)
            .await
            .map_err(|e| classify(&format!("Failed to store chunk {}", chunk.chunk_ref()), e))?;

        tracing::debug!(
            document_id = %chunk.document_id,
            chunk_index = chunk.chunk_index,
            chars = chunk.text.chars().count(),
            "Stored chunk"
        );

        Ok(chunk.chunk_ref())
    }

    async fn ensure_entity(&self, name: &str) -> Result<()> {
        let q = query("MERGE (e:Entity {name: $name})").param("name", name.to_string());

        self.graph
            .run(q)
            .await
            .map_err(|e| classify(&format!("Failed to store entity {name}"), e))?;

        tracing::debug!(entity_name = %name, "Stored entity");
        Ok(())
    }

    async fn ensure_mention(&self, entity_name: &str, chunk: &ChunkRef) -> Result<()> {
        let q = query(
            "MATCH (e:Entity {name: $name}) \
             MATCH (c:Chunk {document_id: $document_id, chunk_index: $chunk_index}) \
             MERGE (e)-[:MENTIONS]->(c) \
             RETURN count(*) AS matched",
        )
        .param("name", entity_name.to_string())
        .param("document_id", chunk.document_id.clone())
        .param("chunk_index", chunk.chunk_index as i64);

        let context = format!("Failed to store mention {entity_name} -> {chunk}");
        let matched = self.write_returning(q, "matched", &context).await?;
        if matched == 0 {
            return Err(DocGraphError::StoreTransient(format!(
                "{context}: entity or chunk node missing"
            )));
        }

        tracing::debug!(entity_name = %entity_name, chunk = %chunk, "Stored mention");
        Ok(())
    }

    async fn write_chunk(&self, chunk: &Chunk, entities: &BTreeSet<String>) -> Result<ChunkRef> {
        let chunk_ref = chunk.chunk_ref();
        let context = format!("Failed to write chunk {chunk_ref}");

        let mut queries = Vec::with_capacity(entities.len() + 1);
        queries.push(chunk_query(chunk));
        queries.extend(entities.iter().map(|name| entity_mention_query(name, &chunk_ref)));

        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| classify(&context, e))?;

        if let Err(e) = txn.run_queries(queries).await {
            let error = classify(&context, e);
            if let Err(rollback) = txn.rollback().await {
                tracing::warn!(chunk = %chunk_ref, error = %rollback, "Rollback failed");
            }
            return Err(error);
        }

        txn.commit().await.map_err(|e| classify(&context, e))?;

        tracing::debug!(
            chunk = %chunk_ref,
            chars = chunk.text.chars().count(),
            entities = entities.len(),
            "Wrote chunk"
        );
        Ok(chunk_ref)
    }

    async fn prune_chunks(&self, document_id: &str, keep: u64) -> Result<u64> {
        let q = query(
            "MATCH (c:Chunk {document_id: $document_id}) \
             WHERE c.chunk_index >= $keep \
             WITH c, c.chunk_index AS idx \
             DETACH DELETE c \
             RETURN count(idx) AS removed",
        )
        .param("document_id", document_id.to_string())
        .param("keep", keep as i64);

        let removed = self
            .write_returning(q, "removed", &format!("Failed to prune chunks of {document_id}"))
            .await?;

        Ok(removed.max(0) as u64)
    }

    async fn clear_all(&self) -> Result<()> {
        self.graph
            .run(query("MATCH (n) WHERE n:Entity OR n:Chunk DETACH DELETE n"))
            .await
            .map_err(|e| classify("Failed to clear graph", e))?;

        tracing::info!("Cleared all Entity and Chunk nodes");
        Ok(())
    }

    async fn statistics(&self) -> Result<GraphStatistics> {
        let num_entities = self
            .count("MATCH (e:Entity) RETURN count(e) AS cnt", "entities")
            .await?;
        let num_chunks = self
            .count("MATCH (c:Chunk) RETURN count(c) AS cnt", "chunks")
            .await?;
        let num_mentions = self
            .count(
                "MATCH (:Entity)-[m:MENTIONS]->(:Chunk) RETURN count(m) AS cnt",
                "mentions",
            )
            .await?;

        Ok(GraphStatistics {
            total_nodes: num_entities + num_chunks,
            total_relationships: num_mentions,
            num_entities,
            num_chunks,
        })
    }
}
