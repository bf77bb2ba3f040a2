use anyhow::Result;
use async_trait::async_trait;
use extract::{EntityNode, Relation};
use serde::Serialize;
use std::collections::BTreeMap;

/// A searchable node that has text but no embedding yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEmbedding {
    /// Store-specific node handle (Neo4j element id)
    pub element_id: String,
    pub text: String,
}

/// Node and edge counts for the end-of-run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub entities: BTreeMap<String, usize>,
    pub relations: usize,
    pub materialized_relations: usize,
    pub searchable: usize,
    pub embedded: usize,
}

impl GraphStats {
    pub fn entity_count(&self) -> usize {
        self.entities.values().sum()
    }
}

/// The graph mutations and reads the loader needs. Every write is an
/// idempotent upsert keyed by stable ids.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Uniqueness constraints on `id` for the given labels.
    async fn ensure_constraints(&self, labels: &[&str]) -> Result<()>;

    async fn upsert_entity(&self, entity: &EntityNode) -> Result<()>;

    /// `false` when either endpoint does not exist; nothing is written then.
    async fn upsert_relation(&self, relation: &Relation) -> Result<bool>;

    async fn refresh_entity_texts(&self) -> Result<()>;

    async fn refresh_relation_texts(&self) -> Result<()>;

    /// Returns how many materialized relation nodes were written.
    async fn materialize_relations(&self) -> Result<usize>;

    async fn mark_searchable(&self, labels: &[&str]) -> Result<()>;

    async fn pending_embeddings(&self) -> Result<Vec<PendingEmbedding>>;

    async fn set_embedding(&self, element_id: &str, embedding: &[f32]) -> Result<()>;

    async fn ensure_vector_index(&self, dimensions: usize) -> Result<()>;

    async fn stats(&self) -> Result<GraphStats>;
}
