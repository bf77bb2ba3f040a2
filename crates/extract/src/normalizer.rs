use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::schema::EntityKind;

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[.,!?;:'"]"#).unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const ID_BYTES: usize = 16;

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = PUNCTUATION.replace_all(lowered.trim(), "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Stable id for an entity: same kind and canonical name, same id, on every run.
pub fn entity_id(kind: EntityKind, canonical_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.label().as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(canonical_name.as_bytes());
    truncated_hex(hasher)
}

/// Stable id for a relation between two entity ids.
pub fn relation_id(source_id: &str, target_id: &str, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(target_id.as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(normalize_name(description).as_bytes());
    truncated_hex(hasher)
}

fn truncated_hex(hasher: Sha256) -> String {
    let result = hasher.finalize();
    hex::encode(&result[..ID_BYTES]) // 32 hex chars
}

/// Trailing legal forms that do not change which organization is meant.
const LEGAL_SUFFIXES: &[&str] = &["inc", "ltd", "llc", "corp", "co", "sa", "sl", "slu", "gmbh"];

/// The key an entity's id is derived from. Depends only on the kind and the
/// name itself, never on which other names appear alongside it.
pub fn canonical_name(kind: EntityKind, name: &str) -> String {
    let normalized = normalize_name(name);
    if kind != EntityKind::Organization {
        return normalized;
    }
    match normalized.rsplit_once(' ') {
        Some((head, suffix)) if LEGAL_SUFFIXES.contains(&suffix) => head.to_string(),
        _ => normalized,
    }
}

/// Spellings seen during one extraction call, so relation endpoints given as
/// names can be mapped to the right entity.
#[derive(Debug, Default)]
pub struct EntityNormalizer {
    /// Per kind, normalized spelling -> canonical key
    spellings: HashMap<EntityKind, HashMap<String, String>>,
}

impl EntityNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical key for `name` within `kind`, remembering the spelling.
    pub fn canonicalize(&mut self, kind: EntityKind, name: &str) -> String {
        let canonical = canonical_name(kind, name);
        self.spellings
            .entry(kind)
            .or_default()
            .insert(normalize_name(name), canonical.clone());
        canonical
    }

    /// Canonical key for an already seen spelling, in any kind.
    pub fn lookup(&self, name: &str) -> Option<(EntityKind, &str)> {
        let normalized = normalize_name(name);
        EntityKind::ALL.iter().find_map(|kind| {
            self.spellings
                .get(kind)
                .and_then(|known| known.get(&normalized))
                .map(|canonical| (*kind, canonical.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_name("Ceràmica"), "ceràmica");
        assert_eq!(normalize_name("Ceràmica!"), "ceràmica");
        assert_eq!(normalize_name("  Escola   d'Art  "), "escola dart");
    }

    #[test]
    fn test_legal_suffix_is_ignored_for_organizations() {
        assert_eq!(canonical_name(EntityKind::Organization, "Lladró S.A."), "lladró");
        assert_eq!(canonical_name(EntityKind::Organization, "OpenAI, Inc."), "openai");
        assert_eq!(canonical_name(EntityKind::Person, "Joan Co"), "joan co");
    }

    #[test]
    fn test_shared_first_names_stay_distinct() {
        let mut normalizer = EntityNormalizer::new();

        let ana = normalizer.canonicalize(EntityKind::Person, "Ana");
        let garcia = normalizer.canonicalize(EntityKind::Person, "Ana García");
        let lopez = normalizer.canonicalize(EntityKind::Person, "Ana López");

        assert_eq!(ana, "ana");
        assert_eq!(garcia, "ana garcía");
        assert_eq!(lopez, "ana lópez");
    }

    #[test]
    fn test_canonical_key_ignores_other_names() {
        let mut alone = EntityNormalizer::new();
        let mut crowded = EntityNormalizer::new();
        crowded.canonicalize(EntityKind::Person, "María");
        crowded.canonicalize(EntityKind::Person, "Pérez");

        assert_eq!(
            alone.canonicalize(EntityKind::Person, "María Pérez"),
            crowded.canonicalize(EntityKind::Person, "María Pérez")
        );
    }

    #[test]
    fn test_ids_are_stable_and_kind_scoped() {
        let a = entity_id(EntityKind::Person, "maria");
        assert_eq!(a, entity_id(EntityKind::Person, "maria"));
        assert_eq!(a.len(), 32);
        assert_ne!(a, entity_id(EntityKind::Organization, "maria"));

        let r = relation_id(&a, "b", "Studied at");
        assert_eq!(r, relation_id(&a, "b", "studied  at."));
        assert_ne!(r, relation_id("b", &a, "studied at"));
    }

    #[test]
    fn test_lookup_finds_known_spellings() {
        let mut normalizer = EntityNormalizer::new();
        normalizer.canonicalize(EntityKind::Movement, "Art Déco");
        normalizer.canonicalize(EntityKind::Organization, "Nao Ltd");

        assert_eq!(normalizer.lookup("art déco"), Some((EntityKind::Movement, "art déco")));
        assert_eq!(normalizer.lookup("NAO LTD."), Some((EntityKind::Organization, "nao")));
        assert_eq!(normalizer.lookup("Bauhaus"), None);
    }
}
