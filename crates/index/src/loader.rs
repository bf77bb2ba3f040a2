use anyhow::{Context, Result};
use extract::{EntityKind, ExtractionResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::embeddings::Embedder;
use crate::store::GraphStore;
use crate::summary::MATERIALIZED_LABEL;

/// What one load did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub entities: usize,
    pub relations: usize,
    pub skipped_relations: usize,
    pub materialized: usize,
    pub embedded: usize,
}

/// Merges extraction results into the graph and keeps the derived text,
/// the materialized relations and the vector index up to date.
pub struct GraphLoader {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    dimensions: usize,
    /// Serializes the graph-wide indexing steps so concurrent loads never
    /// embed the same node twice.
    indexing: Mutex<()>,
}

fn constrained_labels() -> Vec<&'static str> {
    let mut labels: Vec<&'static str> = EntityKind::ALL.iter().map(|k| k.label()).collect();
    labels.push(MATERIALIZED_LABEL);
    labels
}

impl GraphLoader {
    pub fn new(store: Arc<dyn GraphStore>, embedder: Arc<dyn Embedder>, dimensions: usize) -> Self {
        Self {
            store,
            embedder,
            dimensions,
            indexing: Mutex::new(()),
        }
    }

    /// Run every load step for one item. Each step is idempotent, so loading
    /// the same result twice leaves the graph unchanged.
    pub async fn load(&self, item_id: &str, result: &ExtractionResult) -> Result<LoadReport> {
        let labels = constrained_labels();
        self.store
            .ensure_constraints(&labels)
            .await
            .context("Failed to ensure uniqueness constraints")?;

        let mut report = LoadReport::default();

        for entity in result.entities.nodes() {
            self.store.upsert_entity(&entity).await?;
            report.entities += 1;
        }

        for relation in &result.relations {
            if self.store.upsert_relation(relation).await? {
                report.relations += 1;
            } else {
                warn!(
                    item_id,
                    relation_id = %relation.id,
                    source = %relation.source,
                    target = %relation.target,
                    "Relation endpoint not found, skipping relation"
                );
                report.skipped_relations += 1;
            }
        }

        debug!(item_id, entities = report.entities, relations = report.relations, "Fragment upserted");

        let (materialized, embedded) = self.index().await?;
        report.materialized = materialized;
        report.embedded = embedded;

        info!(
            item_id,
            entities = report.entities,
            relations = report.relations,
            skipped_relations = report.skipped_relations,
            materialized = report.materialized,
            embedded = report.embedded,
            "Graph load completed"
        );
        Ok(report)
    }

    /// Graph-wide steps: derived text, materialized relations, searchable
    /// label, missing embeddings, vector index.
    pub async fn index(&self) -> Result<(usize, usize)> {
        let _guard = self.indexing.lock().await;

        self.store
            .refresh_entity_texts()
            .await
            .context("Failed to refresh entity text")?;
        self.store
            .refresh_relation_texts()
            .await
            .context("Failed to refresh relation text")?;
        let materialized = self.store.materialize_relations().await?;

        self.store.mark_searchable(&constrained_labels()).await?;

        let pending = self.store.pending_embeddings().await?;
        let mut embedded = 0;
        for node in &pending {
            let embedding = self
                .embedder
                .embed(&node.text)
                .await
                .context(format!("Failed to embed node {}", node.element_id))?;
            if embedding.len() != self.dimensions {
                anyhow::bail!(
                    "Embedding has {} dimensions, index expects {}",
                    embedding.len(),
                    self.dimensions
                );
            }
            self.store.set_embedding(&node.element_id, &embedding).await?;
            embedded += 1;
        }

        self.store
            .ensure_vector_index(self.dimensions)
            .await
            .context("Failed to ensure vector index")?;

        Ok((materialized, embedded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGraph;
    use crate::store::GraphStats;
    use async_trait::async_trait;
    use extract::schema::{Organization, Person};
    use extract::{entity_id, relation_id, Entities, Relation};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        dimensions: usize,
    }

    impl CountingEmbedder {
        fn new(dimensions: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                dimensions,
            })
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32; self.dimensions])
        }
    }

    fn person(name: &str) -> Person {
        Person {
            id: entity_id(EntityKind::Person, &extract::normalize_name(name)),
            name: name.to_string(),
            description: format!("{} is a ceramist", name),
            profession: Some("ceramist".to_string()),
        }
    }

    fn fragment() -> ExtractionResult {
        let maria = person("María");
        let org = Organization {
            id: entity_id(EntityKind::Organization, "lladró"),
            name: "Lladró".to_string(),
            description: "Porcelain maker".to_string(),
            industry: None,
        };
        let relation = Relation {
            id: relation_id(&maria.id, &org.id, "worked at"),
            source: maria.id.clone(),
            target: org.id.clone(),
            description: "worked at".to_string(),
            strength: 0.9,
        };
        let dangling = Relation {
            id: relation_id("missing", &org.id, "owned"),
            source: "missing".to_string(),
            target: org.id.clone(),
            description: "owned".to_string(),
            strength: 0.5,
        };

        ExtractionResult {
            entities: Entities {
                persons: vec![maria],
                organizations: vec![org],
                ..Default::default()
            },
            relations: vec![relation, dangling],
        }
    }

    async fn counts(graph: &MemoryGraph) -> GraphStats {
        graph.stats().await.unwrap()
    }

    #[tokio::test]
    async fn test_load_builds_graph_and_skips_dangling_relation() {
        let graph = Arc::new(MemoryGraph::new());
        let embedder = CountingEmbedder::new(4);
        let loader = GraphLoader::new(graph.clone(), embedder.clone(), 4);

        let report = loader.load("vid", &fragment()).await.unwrap();

        assert_eq!(report.entities, 2);
        assert_eq!(report.relations, 1);
        assert_eq!(report.skipped_relations, 1);
        assert_eq!(report.materialized, 1);
        // two entities plus one materialized relation
        assert_eq!(report.embedded, 3);

        let stats = counts(&graph).await;
        assert_eq!(stats.entity_count(), 2);
        assert_eq!(stats.relations, 1);
        assert_eq!(stats.searchable, 3);
        assert_eq!(stats.embedded, 3);
        assert!(graph.has_constraint("Person"));
        assert!(graph.has_constraint(MATERIALIZED_LABEL));
        assert_eq!(graph.vector_index_dimensions(), Some(4));

        let maria_id = fragment().entities.persons[0].id.clone();
        assert_eq!(
            graph.entity_text(&maria_id).as_deref(),
            Some("Person: María, type: Person, description: María is a ceramist, profession: ceramist")
        );
    }

    #[tokio::test]
    async fn test_loading_twice_is_idempotent_and_embeds_nothing_new() {
        let graph = Arc::new(MemoryGraph::new());
        let embedder = CountingEmbedder::new(4);
        let loader = GraphLoader::new(graph.clone(), embedder.clone(), 4);

        loader.load("vid", &fragment()).await.unwrap();
        let first = counts(&graph).await;
        let calls_after_first = embedder.calls.load(Ordering::SeqCst);

        let second_report = loader.load("vid", &fragment()).await.unwrap();
        let second = counts(&graph).await;

        assert_eq!(first, second);
        assert_eq!(second_report.embedded, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_entities_shared_across_items_merge() {
        let graph = Arc::new(MemoryGraph::new());
        let loader = GraphLoader::new(graph.clone(), CountingEmbedder::new(2), 2);

        loader.load("a", &fragment()).await.unwrap();
        let other = ExtractionResult {
            entities: Entities {
                persons: vec![person("María"), person("Joan")],
                ..Default::default()
            },
            relations: vec![],
        };
        let report = loader.load("b", &other).await.unwrap();

        assert_eq!(report.embedded, 1);
        let stats = counts(&graph).await;
        assert_eq!(stats.entities["Person"], 2);
        assert_eq!(stats.entities["Organization"], 1);
    }

    #[tokio::test]
    async fn test_wrong_embedding_size_fails() {
        let graph = Arc::new(MemoryGraph::new());
        let loader = GraphLoader::new(graph, CountingEmbedder::new(3), 4);

        assert!(loader.load("vid", &fragment()).await.is_err());
    }
}
