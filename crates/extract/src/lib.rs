pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod schema;

pub use llm::{ChatClient, ChatMessage, ChatModel, ResponseFormat, Role};
pub use normalizer::{canonical_name, entity_id, normalize_name, relation_id, EntityNormalizer};
pub use schema::{Entities, Entity, EntityKind, EntityNode, ExtractionResult, Relation};

use anyhow::{Context, Result};
use common::{Artifact, ArtifactStore, PipelineError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Turns refined text into a validated entity/relation fragment with stable ids.
pub struct StructuredExtractor {
    model: Arc<dyn ChatModel>,
    store: ArtifactStore,
}

impl StructuredExtractor {
    pub fn new(model: Arc<dyn ChatModel>, store: ArtifactStore) -> Self {
        Self { model, store }
    }

    /// Extract, validate, assign ids and persist `structured_<id>.json`.
    pub async fn extract(&self, item_id: &str, text: &str) -> Result<ExtractionResult> {
        let result = if text.trim().is_empty() {
            warn!(item_id, "No text to extract from, persisting empty result");
            ExtractionResult::default()
        } else {
            let messages = prompt::build_extraction_messages(text);
            let reply = self
                .model
                .complete(&messages, ResponseFormat::Json)
                .await
                .context(format!("Structured extraction request failed for item {}", item_id))?;

            let parsed = parse_reply(&reply).context(format!("Invalid extraction for item {}", item_id))?;
            assign_ids(parsed)
        };

        let json = serde_json::to_string_pretty(&result)?;
        self.store.write_text(item_id, Artifact::Structured, &json).await?;

        info!(
            item_id,
            entities = result.entities.len(),
            relations = result.relations.len(),
            "Structured extraction completed"
        );
        Ok(result)
    }

    /// Read a previously persisted extraction.
    pub async fn load_persisted(&self, item_id: &str) -> Result<Option<ExtractionResult>> {
        match self.store.read_text(item_id, Artifact::Structured).await? {
            Some(raw) => {
                let result = serde_json::from_str(&raw)
                    .context(format!("Failed to parse persisted extraction for item {}", item_id))?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }
}

/// Strict parse plus semantic checks; any violation is a schema validation error.
pub fn parse_reply(reply: &str) -> Result<ExtractionResult> {
    let body = llm::strip_code_fences(reply);
    let mut result: ExtractionResult = serde_json::from_str(body)
        .map_err(|e| PipelineError::SchemaValidation(e.to_string()))?;

    for node in result.entities.nodes() {
        if node.name.trim().is_empty() {
            return Err(PipelineError::SchemaValidation(format!(
                "{} entity {:?} has an empty name",
                node.kind, node.id
            ))
            .into());
        }
    }

    for relation in &mut result.relations {
        if !relation.strength.is_finite() {
            return Err(PipelineError::SchemaValidation(format!(
                "relation {} -> {} has a non-finite strength",
                relation.source, relation.target
            ))
            .into());
        }
        relation.strength = relation.strength.clamp(0.0, 1.0);
    }

    Ok(result)
}

/// Replace the model's local refs with stable ids and collapse duplicates.
///
/// Relation endpoints that match neither a ref nor a known name are left as
/// they are; the graph loader skips relations whose endpoints do not exist.
pub fn assign_ids(mut result: ExtractionResult) -> ExtractionResult {
    let mut normalizer = EntityNormalizer::new();
    let mut refs: HashMap<String, String> = HashMap::new();

    let entities = &mut result.entities;
    entities.persons = resolve_kind(std::mem::take(&mut entities.persons), &mut normalizer, &mut refs);
    entities.organizations =
        resolve_kind(std::mem::take(&mut entities.organizations), &mut normalizer, &mut refs);
    entities.educational_centers =
        resolve_kind(std::mem::take(&mut entities.educational_centers), &mut normalizer, &mut refs);
    entities.movements = resolve_kind(std::mem::take(&mut entities.movements), &mut normalizer, &mut refs);
    entities.products = resolve_kind(std::mem::take(&mut entities.products), &mut normalizer, &mut refs);

    let mut seen = HashSet::new();
    let mut relations = Vec::with_capacity(result.relations.len());
    for mut relation in std::mem::take(&mut result.relations) {
        relation.source = resolve_ref(&relation.source, &refs, &normalizer);
        relation.target = resolve_ref(&relation.target, &refs, &normalizer);
        relation.id = relation_id(&relation.source, &relation.target, &relation.description);
        if seen.insert(relation.id.clone()) {
            relations.push(relation);
        }
    }
    result.relations = relations;

    result
}

fn resolve_kind<E: Entity>(
    list: Vec<E>,
    normalizer: &mut EntityNormalizer,
    refs: &mut HashMap<String, String>,
) -> Vec<E> {
    let mut kept: Vec<E> = Vec::with_capacity(list.len());

    for mut entity in list {
        let canonical = normalizer.canonicalize(E::KIND, entity.name());
        let id = entity_id(E::KIND, &canonical);

        if !entity.id().is_empty() {
            refs.entry(entity.id().to_string()).or_insert_with(|| id.clone());
        }
        if kept.iter().any(|k| k.id() == id) {
            continue;
        }
        entity.set_id(id);
        kept.push(entity);
    }

    kept
}

fn resolve_ref(reference: &str, refs: &HashMap<String, String>, normalizer: &EntityNormalizer) -> String {
    if let Some(id) = refs.get(reference) {
        return id.clone();
    }
    if let Some((kind, canonical)) = normalizer.lookup(reference) {
        return entity_id(kind, canonical);
    }
    warn!(reference, "Relation endpoint does not match any extracted entity");
    reference.to_string()
}
