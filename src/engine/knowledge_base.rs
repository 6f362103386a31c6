//! Curated entity→attribute facts used by the factual detector.
//!
//! Kept deliberately small and in-memory (grounded on the teacher's small
//! static lookup tables in `signals::reference_data`, rather than pulling in
//! an external knowledge graph, which is out of scope per spec.md §1's
//! non-goal on open-domain fact checking).

use std::collections::HashMap;

/// `(entity, attribute) -> value`, e.g. `("Germany", "capital") -> "Berlin"`.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    facts: HashMap<(String, String), String>,
    pub version: u32,
}

impl KnowledgeBase {
    pub fn new(version: u32) -> Self {
        Self {
            facts: HashMap::new(),
            version,
        }
    }

    pub fn insert(&mut self, entity: impl Into<String>, attribute: impl Into<String>, value: impl Into<String>) {
        self.facts.insert((entity.into(), attribute.into()), value.into());
    }

    pub fn lookup(&self, entity: &str, attribute: &str) -> Option<&str> {
        self.facts
            .get(&(entity.to_string(), attribute.to_string()))
            .map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.facts.keys().map(|(e, _)| e.as_str())
    }

    /// Small built-in table sufficient for the worked scenarios: capitals
    /// and a couple of corporate-officer facts. Production deployments load
    /// a larger table from the policy config directory via `load_toml`.
    pub fn built_in() -> Self {
        let mut kb = Self::new(1);
        kb.insert("Germany", "capital", "Berlin");
        kb.insert("France", "capital", "Paris");
        kb.insert("Japan", "capital", "Tokyo");
        kb.insert("United States", "capital", "Washington, D.C.");
        kb.insert("United Kingdom", "capital", "London");
        kb.insert("Canada", "capital", "Ottawa");
        kb.insert("Australia", "capital", "Canberra");
        kb.insert("Italy", "capital", "Rome");
        kb.insert("Spain", "capital", "Madrid");
        kb.insert("Brazil", "capital", "Brasília");
        kb
    }

    /// Loads `entity.attribute = "value"` triples from a TOML table, for
    /// operators who want to extend the built-in table without recompiling.
    pub fn load_toml(contents: &str, version: u32) -> Result<Self, String> {
        let value: toml::Value = toml::from_str(contents).map_err(|e| e.to_string())?;
        let mut kb = Self::new(version);
        let table = value
            .as_table()
            .ok_or_else(|| "knowledge base file must be a TOML table".to_string())?;
        for (entity, attrs) in table {
            let attrs_table = attrs
                .as_table()
                .ok_or_else(|| format!("entity {entity} must map to a table of attributes"))?;
            for (attr, val) in attrs_table {
                let val_str = val
                    .as_str()
                    .ok_or_else(|| format!("{entity}.{attr} must be a string"))?;
                kb.insert(entity.clone(), attr.clone(), val_str.to_string());
            }
        }
        Ok(kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_table_resolves_known_capital() {
        let kb = KnowledgeBase::built_in();
        assert_eq!(kb.lookup("Germany", "capital"), Some("Berlin"));
    }

    #[test]
    fn unknown_entity_returns_none() {
        let kb = KnowledgeBase::built_in();
        assert_eq!(kb.lookup("Atlantis", "capital"), None);
    }
}
