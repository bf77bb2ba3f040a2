use anyhow::Result;
use async_trait::async_trait;
use extract::{EntityKind, EntityNode, Relation};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use crate::store::{GraphStats, GraphStore, PendingEmbedding};
use crate::summary::{self, SummaryTemplate, MATERIALIZED_LABEL, SEARCHABLE_LABEL};

#[derive(Debug, Clone, Default)]
struct Node {
    labels: BTreeSet<String>,
    properties: BTreeMap<String, String>,
    text: Option<String>,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
struct Edge {
    source: usize,
    target: usize,
    description: String,
    strength: f64,
    text: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<Node>,
    /// (label, id) -> node index
    by_id: HashMap<(String, String), usize>,
    /// RELATION edges by relation id
    relations: BTreeMap<String, Edge>,
    /// materialized node index -> (FROM, TO) node indices
    links: BTreeMap<usize, (usize, usize)>,
    constraints: BTreeSet<String>,
    vector_index: Option<usize>,
}

impl State {
    fn merge_node(&mut self, label: &str, id: &str) -> usize {
        let key = (label.to_string(), id.to_string());
        if let Some(&index) = self.by_id.get(&key) {
            return index;
        }
        let mut node = Node::default();
        node.labels.insert(label.to_string());
        node.properties.insert("id".to_string(), id.to_string());
        self.nodes.push(node);
        let index = self.nodes.len() - 1;
        self.by_id.insert(key, index);
        index
    }

    fn find_entity(&self, id: &str) -> Option<usize> {
        EntityKind::ALL
            .iter()
            .find_map(|kind| self.by_id.get(&(kind.label().to_string(), id.to_string())).copied())
    }

    fn count_label(&self, label: &str) -> usize {
        self.nodes.iter().filter(|n| n.labels.contains(label)).count()
    }
}

/// In-process graph with the same upsert semantics as the Neo4j store.
/// Element ids are node positions.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<State>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `text` of the entity with this id, if it has one.
    pub fn entity_text(&self, id: &str) -> Option<String> {
        let state = self.state.lock().ok()?;
        let index = state.find_entity(id)?;
        state.nodes[index].text.clone()
    }

    pub fn has_constraint(&self, label: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.constraints.contains(label))
            .unwrap_or(false)
    }

    pub fn vector_index_dimensions(&self) -> Option<usize> {
        self.state.lock().ok().and_then(|s| s.vector_index)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory graph lock poisoned"))
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn ensure_constraints(&self, labels: &[&str]) -> Result<()> {
        let mut state = self.lock()?;
        state.constraints.extend(labels.iter().map(|l| l.to_string()));
        Ok(())
    }

    async fn upsert_entity(&self, entity: &EntityNode) -> Result<()> {
        let mut state = self.lock()?;
        let index = state.merge_node(entity.kind.label(), &entity.id);
        let node = &mut state.nodes[index];

        node.properties.insert("name".to_string(), entity.name.clone());
        node.properties.insert("kind".to_string(), entity.kind.label().to_string());
        node.properties.insert("description".to_string(), entity.description.clone());
        let key = entity.kind.attribute_key().to_string();
        match &entity.attribute {
            Some(value) => {
                node.properties.insert(key, value.clone());
            }
            None => {
                node.properties.remove(&key);
            }
        }
        Ok(())
    }

    async fn upsert_relation(&self, relation: &Relation) -> Result<bool> {
        let mut state = self.lock()?;
        let (Some(source), Some(target)) = (state.find_entity(&relation.source), state.find_entity(&relation.target))
        else {
            return Ok(false);
        };

        let edge = state.relations.entry(relation.id.clone()).or_insert(Edge {
            source,
            target,
            description: String::new(),
            strength: 0.0,
            text: None,
        });
        edge.description = relation.description.clone();
        edge.strength = relation.strength;
        Ok(true)
    }

    async fn refresh_entity_texts(&self) -> Result<()> {
        let mut state = self.lock()?;
        for kind in EntityKind::ALL {
            let template = SummaryTemplate::for_kind(kind);
            for node in state.nodes.iter_mut().filter(|n| n.labels.contains(template.label)) {
                node.text = Some(template.render(&node.properties));
            }
        }
        Ok(())
    }

    async fn refresh_relation_texts(&self) -> Result<()> {
        let mut state = self.lock()?;
        for (id, edge) in state.relations.iter_mut() {
            edge.text = Some(summary::relation_text(id, &edge.description, edge.strength));
        }
        Ok(())
    }

    async fn materialize_relations(&self) -> Result<usize> {
        let mut state = self.lock()?;

        let ready: Vec<(String, usize, usize, String)> = state
            .relations
            .iter()
            .filter_map(|(id, edge)| {
                let source_text = state.nodes[edge.source].text.as_ref()?;
                let target_text = state.nodes[edge.target].text.as_ref()?;
                let relation_text = edge.text.as_ref()?;
                Some((
                    id.clone(),
                    edge.source,
                    edge.target,
                    summary::materialized_text(source_text, target_text, relation_text),
                ))
            })
            .collect();

        for (id, source, target, text) in &ready {
            let index = state.merge_node(MATERIALIZED_LABEL, id);
            state.nodes[index].text = Some(text.clone());
            state.links.insert(index, (*source, *target));
        }
        Ok(ready.len())
    }

    async fn mark_searchable(&self, labels: &[&str]) -> Result<()> {
        let mut state = self.lock()?;
        for node in state.nodes.iter_mut() {
            if labels.iter().any(|l| node.labels.contains(*l)) {
                node.labels.insert(SEARCHABLE_LABEL.to_string());
            }
        }
        Ok(())
    }

    async fn pending_embeddings(&self) -> Result<Vec<PendingEmbedding>> {
        let state = self.lock()?;
        Ok(state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.labels.contains(SEARCHABLE_LABEL) && n.embedding.is_none())
            .filter_map(|(index, n)| {
                n.text.as_ref().map(|text| PendingEmbedding {
                    element_id: index.to_string(),
                    text: text.clone(),
                })
            })
            .collect())
    }

    async fn set_embedding(&self, element_id: &str, embedding: &[f32]) -> Result<()> {
        let mut state = self.lock()?;
        let index: usize = element_id
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown element id: {}", element_id))?;
        let node = state
            .nodes
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("Unknown element id: {}", element_id))?;
        node.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn ensure_vector_index(&self, dimensions: usize) -> Result<()> {
        let mut state = self.lock()?;
        state.vector_index.get_or_insert(dimensions);
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let state = self.lock()?;
        let mut stats = GraphStats::default();
        for kind in EntityKind::ALL {
            stats
                .entities
                .insert(kind.label().to_string(), state.count_label(kind.label()));
        }
        stats.relations = state.relations.len();
        stats.materialized_relations = state.count_label(MATERIALIZED_LABEL);
        stats.searchable = state.count_label(SEARCHABLE_LABEL);
        stats.embedded = state
            .nodes
            .iter()
            .filter(|n| n.labels.contains(SEARCHABLE_LABEL) && n.embedding.is_some())
            .count();
        Ok(stats)
    }
}
