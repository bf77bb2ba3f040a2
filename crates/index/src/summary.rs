//! The `text` property every searchable node and edge carries.
//!
//! Templates are declared once and rendered two ways: to a Cypher `SET`
//! for the Neo4j store and to a plain string for the in-memory graph. Both
//! renderings must produce the same text for the same properties.

use extract::EntityKind;
use std::collections::BTreeMap;

/// Label shared by every entity node, used for endpoint lookups.
pub const ENTITY_LABEL: &str = "Entity";
/// Label added to every node that gets an embedding.
pub const SEARCHABLE_LABEL: &str = "Searchable";
pub const MATERIALIZED_LABEL: &str = "MaterializedRelation";

/// `<heading>: <name>, <caption>: <property>, ...`
#[derive(Debug, Clone, Copy)]
pub struct SummaryTemplate {
    pub label: &'static str,
    pub heading: &'static str,
    /// (caption, property) pairs after the name
    pub fields: [(&'static str, &'static str); 3],
}

impl SummaryTemplate {
    pub fn for_kind(kind: EntityKind) -> Self {
        let caption = match kind {
            EntityKind::Person => "profession",
            EntityKind::Organization => "industry",
            EntityKind::EducationalCenter => "location",
            EntityKind::Movement => "category",
            EntityKind::Product => "subtype",
        };
        let heading = match kind {
            EntityKind::Person => "Person",
            EntityKind::Organization => "Organization",
            EntityKind::EducationalCenter => "Educational center",
            EntityKind::Movement => "Movement",
            EntityKind::Product => "Product",
        };
        Self {
            label: kind.label(),
            heading,
            fields: [
                ("type", "kind"),
                ("description", "description"),
                (caption, kind.attribute_key()),
            ],
        }
    }

    /// Cypher statement setting `n.text` on every node with this label.
    pub fn to_cypher(&self) -> String {
        let mut expr = format!("'{}: ' + coalesce(n.name, '')", self.heading);
        for (caption, property) in &self.fields {
            expr.push_str(&format!(" + ', {}: ' + coalesce(n.{}, '')", caption, property));
        }
        format!("MATCH (n:{}) SET n.text = {}", self.label, expr)
    }

    /// Same text computed from a property map; missing properties render empty.
    pub fn render(&self, properties: &BTreeMap<String, String>) -> String {
        let get = |key: &str| properties.get(key).map(String::as_str).unwrap_or("");
        let mut text = format!("{}: {}", self.heading, get("name"));
        for (caption, property) in &self.fields {
            text.push_str(&format!(", {}: {}", caption, get(property)));
        }
        text
    }
}

pub const RELATION_TEXT_CYPHER: &str = "MATCH ()-[r:RELATION]->() \
     SET r.text = 'Relation: ' + coalesce(r.description, '') + \
     ', strength: ' + toString(coalesce(r.strength, 0.0)) + \
     ', id: ' + coalesce(r.id, '')";

/// Cypher's `toString` on a float always keeps a fractional part, as does `{:?}`.
pub fn relation_text(id: &str, description: &str, strength: f64) -> String {
    format!("Relation: {}, strength: {:?}, id: {}", description, strength, id)
}

pub fn materialized_text(source_text: &str, target_text: &str, relation_text: &str) -> String {
    format!(
        "Source entity: {}\nTarget entity: {}\nRelation: {}",
        source_text, target_text, relation_text
    )
}
