use crate::llm::ChatMessage;

const EXTRACTION_SYSTEM: &str = r#"You are an expert in semantic analysis and structured information extraction from natural text.

Identify entities and the relations between them in the text provided by the user.

INSTRUCTIONS:
1. Output ONLY one valid JSON object, nothing else
2. Use the exact schema below; do not add or rename keys
3. Always include every key; use empty lists instead of omitting a field
4. If nothing is found, return the schema with all lists empty

SCHEMA:
{
  "entities": {
    "persons": [{"id": "E1", "name": "...", "description": "...", "profession": "..."}],
    "organizations": [{"id": "E2", "name": "...", "description": "...", "industry": "..."}],
    "educational_centers": [{"id": "E3", "name": "...", "description": "...", "location": "..."}],
    "movements": [{"id": "E4", "name": "...", "description": "...", "category": "..."}],
    "products": [{"id": "E5", "name": "...", "description": "...", "subtype": "material|technique|type|other"}]
  },
  "relations": [
    {"source": "E1", "target": "E2", "description": "why the two entities are related", "strength": 0.8}
  ]
}

RULES:
- Use sequential ids across all entity lists: E1, E2, E3, etc.
- Relation source and target must be entity ids from this same answer
- strength is a number between 0 and 1
- Variant attributes (profession, industry, location, category, subtype) may be null when unknown
- Products are materials, techniques, types of object or other crafted goods
- Movements are artistic or design currents and styles"#;

pub fn build_extraction_messages(text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(EXTRACTION_SYSTEM),
        ChatMessage::user(format!("TEXT:\n{}\n\nJSON OUTPUT:", text)),
    ]
}
