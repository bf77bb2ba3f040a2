use serde::{Deserialize, Serialize};
use std::fmt;

/// The five entity variants the extractor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Person,
    Organization,
    EducationalCenter,
    Movement,
    Product,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Person,
        EntityKind::Organization,
        EntityKind::EducationalCenter,
        EntityKind::Movement,
        EntityKind::Product,
    ];

    /// Graph label for nodes of this kind.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Person => "Person",
            EntityKind::Organization => "Organization",
            EntityKind::EducationalCenter => "EducationalCenter",
            EntityKind::Movement => "Movement",
            EntityKind::Product => "Product",
        }
    }

    /// Name of the variant-specific attribute.
    pub fn attribute_key(&self) -> &'static str {
        match self {
            EntityKind::Person => "profession",
            EntityKind::Organization => "industry",
            EntityKind::EducationalCenter => "location",
            EntityKind::Movement => "category",
            EntityKind::Product => "subtype",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Person {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profession: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Organization {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub industry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EducationalCenter {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Movement {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductSubtype {
    Material,
    Technique,
    Type,
    Other,
}

impl ProductSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductSubtype::Material => "material",
            ProductSubtype::Technique => "technique",
            ProductSubtype::Type => "type",
            ProductSubtype::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtype: Option<ProductSubtype>,
}

/// Flat, kind-tagged view of any entity; what the graph layer consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub description: String,
    pub attribute: Option<String>,
}

/// Shared access to the common fields of every entity variant.
pub trait Entity {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn attribute(&self) -> Option<String>;

    fn to_node(&self) -> EntityNode {
        EntityNode {
            kind: Self::KIND,
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            attribute: self.attribute(),
        }
    }
}

impl Entity for Person {
    const KIND: EntityKind = EntityKind::Person;
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn attribute(&self) -> Option<String> {
        self.profession.clone()
    }
}

impl Entity for Organization {
    const KIND: EntityKind = EntityKind::Organization;
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn attribute(&self) -> Option<String> {
        self.industry.clone()
    }
}

impl Entity for EducationalCenter {
    const KIND: EntityKind = EntityKind::EducationalCenter;
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn attribute(&self) -> Option<String> {
        self.location.clone()
    }
}

impl Entity for Movement {
    const KIND: EntityKind = EntityKind::Movement;
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn attribute(&self) -> Option<String> {
        self.category.clone()
    }
}

impl Entity for Product {
    const KIND: EntityKind = EntityKind::Product;
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn attribute(&self) -> Option<String> {
        self.subtype.map(|s| s.as_str().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entities {
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub educational_centers: Vec<EducationalCenter>,
    #[serde(default)]
    pub movements: Vec<Movement>,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Entities {
    pub fn len(&self) -> usize {
        self.persons.len()
            + self.organizations.len()
            + self.educational_centers.len()
            + self.movements.len()
            + self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entity as a flat node, grouped by kind in declaration order.
    pub fn nodes(&self) -> Vec<EntityNode> {
        let mut nodes = Vec::with_capacity(self.len());
        nodes.extend(self.persons.iter().map(Entity::to_node));
        nodes.extend(self.organizations.iter().map(Entity::to_node));
        nodes.extend(self.educational_centers.iter().map(Entity::to_node));
        nodes.extend(self.movements.iter().map(Entity::to_node));
        nodes.extend(self.products.iter().map(Entity::to_node));
        nodes
    }
}

/// Directed, weighted link between two entities, by entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relation {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
    pub strength: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionResult {
    pub entities: Entities,
    pub relations: Vec<Relation>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_shape() {
        let raw = r#"{
            "entities": {
                "persons": [{"id": "E1", "name": "Maria", "description": "potter", "profession": "ceramist"}],
                "organizations": [],
                "educational_centers": [{"id": "E2", "name": "Escola d'Art", "description": "school", "location": "Manises"}],
                "movements": [],
                "products": [{"id": "E3", "name": "Reflejo metálico", "description": "glaze", "subtype": "technique"}]
            },
            "relations": [{"source": "E1", "target": "E2", "description": "studied at", "strength": 0.8}]
        }"#;

        let result: ExtractionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.entities.len(), 3);
        assert_eq!(result.entities.products[0].subtype, Some(ProductSubtype::Technique));
        assert_eq!(result.relations[0].id, "");

        let nodes = result.entities.nodes();
        assert_eq!(nodes[1].kind, EntityKind::EducationalCenter);
        assert_eq!(nodes[1].attribute.as_deref(), Some("Manises"));
        assert_eq!(nodes[2].attribute.as_deref(), Some("technique"));
    }

    #[test]
    fn test_empty_lists_are_valid() {
        let result: ExtractionResult = serde_json::from_str(
            r#"{"entities": {"persons": [], "organizations": [], "educational_centers": [], "movements": [], "products": []}, "relations": []}"#,
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_missing_top_level_key_is_rejected() {
        assert!(serde_json::from_str::<ExtractionResult>(r#"{"entities": {}}"#).is_err());
        assert!(serde_json::from_str::<ExtractionResult>(r#"{"relations": []}"#).is_err());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let extra_top = r#"{"entities": {}, "relations": [], "notes": "x"}"#;
        assert!(serde_json::from_str::<ExtractionResult>(extra_top).is_err());

        let extra_entity = r#"{"entities": {"persons": [{"name": "A", "age": 3}]}, "relations": []}"#;
        assert!(serde_json::from_str::<ExtractionResult>(extra_entity).is_err());

        let bad_subtype = r#"{"entities": {"products": [{"name": "A", "subtype": "tool"}]}, "relations": []}"#;
        assert!(serde_json::from_str::<ExtractionResult>(bad_subtype).is_err());
    }
}
