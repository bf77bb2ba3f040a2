use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::Neo4jConfig;
use common::PipelineError;
use extract::{EntityKind, EntityNode, Relation};
use neo4rs::{Graph, Query};
use tracing::{debug, info};

use crate::store::{GraphStats, GraphStore, PendingEmbedding};
use crate::summary::{
    SummaryTemplate, ENTITY_LABEL, MATERIALIZED_LABEL, RELATION_TEXT_CYPHER, SEARCHABLE_LABEL,
};

/// Neo4j over Bolt.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    /// Connect and probe once; failure here is fatal for the whole load.
    pub async fn connect(config: &Neo4jConfig, password: &str) -> Result<Self> {
        let graph = Graph::new(config.uri.as_str(), config.user.as_str(), password)
            .await
            .map_err(|e| PipelineError::GraphConnection(format!("{}: {}", config.uri, e)))?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .map_err(|e| PipelineError::GraphConnection(format!("{}: {}", config.uri, e)))?;

        info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self::new(graph))
    }

    async fn run(&self, cypher: String, operation: &str) -> Result<()> {
        debug!(operation, "Running Cypher");
        self.graph
            .run(Query::new(cypher))
            .await
            .context(format!("Neo4j {} failed", operation))
    }

    async fn count(&self, query: Query) -> Result<usize> {
        let mut result = self.graph.execute(query).await?;
        let count = if let Some(row) = result.next().await? {
            row.get::<i64>("count").unwrap_or(0) as usize
        } else {
            0
        };
        Ok(count)
    }
}

fn retrieval_labels_predicate(labels: &[&str]) -> String {
    labels
        .iter()
        .map(|label| format!("n:{}", label))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn ensure_constraints(&self, labels: &[&str]) -> Result<()> {
        for label in labels {
            self.run(
                format!("CREATE CONSTRAINT IF NOT EXISTS FOR (n:{}) REQUIRE n.id IS UNIQUE", label),
                "create constraint",
            )
            .await?;
        }
        self.run(
            format!(
                "CREATE INDEX entity_id_index IF NOT EXISTS FOR (e:{}) ON (e.id)",
                ENTITY_LABEL
            ),
            "create index",
        )
        .await
    }

    async fn upsert_entity(&self, entity: &EntityNode) -> Result<()> {
        let attribute_key = entity.kind.attribute_key();
        let attribute_set = match entity.attribute {
            Some(_) => format!("n.{} = $attribute", attribute_key),
            None => format!("n.{} = null", attribute_key),
        };

        let mut query = Query::new(format!(
            r#"
            MERGE (n:{entity}:{label} {{id: $id}})
            SET n.name = $name,
                n.kind = $kind,
                n.description = $description,
                {attribute_set}
            "#,
            entity = ENTITY_LABEL,
            label = entity.kind.label(),
        ))
        .param("id", entity.id.clone())
        .param("name", entity.name.clone())
        .param("kind", entity.kind.label().to_string())
        .param("description", entity.description.clone());

        if let Some(attribute) = &entity.attribute {
            query = query.param("attribute", attribute.clone());
        }

        self.graph
            .run(query)
            .await
            .context(format!("Failed to upsert {} {}", entity.kind, entity.id))
    }

    async fn upsert_relation(&self, relation: &Relation) -> Result<bool> {
        let query = Query::new(format!(
            r#"
            MATCH (source:{entity} {{id: $source_id}})
            MATCH (target:{entity} {{id: $target_id}})
            MERGE (source)-[r:RELATION {{id: $id}}]->(target)
            SET r.description = $description,
                r.strength = $strength
            RETURN count(r) AS count
            "#,
            entity = ENTITY_LABEL,
        ))
        .param("source_id", relation.source.clone())
        .param("target_id", relation.target.clone())
        .param("id", relation.id.clone())
        .param("description", relation.description.clone())
        .param("strength", relation.strength);

        let written = self
            .count(query)
            .await
            .context(format!("Failed to upsert relation {}", relation.id))?;
        Ok(written > 0)
    }

    async fn refresh_entity_texts(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            self.run(SummaryTemplate::for_kind(kind).to_cypher(), "refresh entity text")
                .await?;
        }
        Ok(())
    }

    async fn refresh_relation_texts(&self) -> Result<()> {
        self.run(RELATION_TEXT_CYPHER.to_string(), "refresh relation text")
            .await
    }

    async fn materialize_relations(&self) -> Result<usize> {
        let query = Query::new(format!(
            r#"
            MATCH (source)-[r:RELATION]->(target)
            WHERE source.text IS NOT NULL AND target.text IS NOT NULL AND r.text IS NOT NULL
            MERGE (m:{materialized} {{id: r.id}})
            SET m.text = 'Source entity: ' + source.text + '\n' +
                         'Target entity: ' + target.text + '\n' +
                         'Relation: ' + r.text
            MERGE (m)-[:FROM]->(source)
            MERGE (m)-[:TO]->(target)
            RETURN count(m) AS count
            "#,
            materialized = MATERIALIZED_LABEL,
        ));
        self.count(query)
            .await
            .context("Failed to materialize relations")
    }

    async fn mark_searchable(&self, labels: &[&str]) -> Result<()> {
        self.run(
            format!(
                "MATCH (n) WHERE {} SET n:{}",
                retrieval_labels_predicate(labels),
                SEARCHABLE_LABEL
            ),
            "set searchable label",
        )
        .await
    }

    async fn pending_embeddings(&self) -> Result<Vec<PendingEmbedding>> {
        let query = Query::new(format!(
            r#"
            MATCH (n:{searchable})
            WHERE n.text IS NOT NULL AND n.embedding IS NULL
            RETURN elementId(n) AS eid, n.text AS text
            "#,
            searchable = SEARCHABLE_LABEL,
        ));

        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to query nodes without embeddings")?;

        let mut pending = Vec::new();
        while let Some(row) = result.next().await? {
            pending.push(PendingEmbedding {
                element_id: row.get("eid").context("Missing eid")?,
                text: row.get("text").context("Missing text")?,
            });
        }
        Ok(pending)
    }

    async fn set_embedding(&self, element_id: &str, embedding: &[f32]) -> Result<()> {
        let vector: Vec<f64> = embedding.iter().map(|v| *v as f64).collect();
        let query = Query::new("MATCH (n) WHERE elementId(n) = $eid SET n.embedding = $vector".to_string())
            .param("eid", element_id.to_string())
            .param("vector", vector);

        self.graph
            .run(query)
            .await
            .context(format!("Failed to store embedding for node {}", element_id))
    }

    async fn ensure_vector_index(&self, dimensions: usize) -> Result<()> {
        self.run(
            format!(
                "CREATE VECTOR INDEX searchable_embedding IF NOT EXISTS \
                 FOR (n:{}) ON (n.embedding) \
                 OPTIONS {{indexConfig: {{`vector.dimensions`: {}, `vector.similarity_function`: 'cosine'}}}}",
                SEARCHABLE_LABEL, dimensions
            ),
            "create vector index",
        )
        .await
    }

    async fn stats(&self) -> Result<GraphStats> {
        let mut stats = GraphStats::default();

        for kind in EntityKind::ALL {
            let count = self
                .count(Query::new(format!(
                    "MATCH (n:{}) RETURN count(n) as count",
                    kind.label()
                )))
                .await?;
            stats.entities.insert(kind.label().to_string(), count);
        }

        stats.relations = self
            .count(Query::new("MATCH ()-[r:RELATION]->() RETURN count(r) as count".to_string()))
            .await?;
        stats.materialized_relations = self
            .count(Query::new(format!(
                "MATCH (n:{}) RETURN count(n) as count",
                MATERIALIZED_LABEL
            )))
            .await?;
        stats.searchable = self
            .count(Query::new(format!(
                "MATCH (n:{}) RETURN count(n) as count",
                SEARCHABLE_LABEL
            )))
            .await?;
        stats.embedded = self
            .count(Query::new(format!(
                "MATCH (n:{}) WHERE n.embedding IS NOT NULL RETURN count(n) as count",
                SEARCHABLE_LABEL
            )))
            .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_labels_predicate() {
        assert_eq!(
            retrieval_labels_predicate(&["Person", "MaterializedRelation"]),
            "n:Person OR n:MaterializedRelation"
        );
    }
}
