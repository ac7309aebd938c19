// ── Entity query helpers ──
//
// Pure read-side filters over a list of entities. Used on REST snapshots
// and on the local cache alike.

use serde_json::Value;

use crate::model::Entity;

/// How a search term is matched against ids and display names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    #[default]
    Substring,
    Prefix,
}

/// Filter criteria. Every set field must match; an empty query matches all.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    /// Case-insensitive search on the entity id or `friendly_name`.
    pub search: Option<String>,
    pub mode: MatchMode,
    /// Only entities in this domain (`"light"`, `"sensor"`, ...).
    pub domain: Option<String>,
    /// Only entities whose attribute equals this value.
    pub attribute: Option<(String, Value)>,
}

impl EntityQuery {
    pub fn search(mut self, term: impl Into<String>, mode: MatchMode) -> Self {
        self.search = Some(term.into());
        self.mode = mode;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attribute = Some((key.into(), value));
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(ref domain) = self.domain {
            if entity.domain() != domain {
                return false;
            }
        }

        if let Some((ref key, ref expected)) = self.attribute {
            if entity.attributes.get(key) != Some(expected) {
                return false;
            }
        }

        match self.search {
            Some(ref term) => {
                let term = term.to_lowercase();
                text_matches(&entity.id, &term, self.mode)
                    || entity
                        .friendly_name()
                        .is_some_and(|name| text_matches(name, &term, self.mode))
            }
            None => true,
        }
    }

    /// Apply the query to any iterator of entity references, keeping order.
    pub fn filter<I, E>(&self, entities: I) -> Vec<E>
    where
        I: IntoIterator<Item = E>,
        E: AsRef<Entity>,
    {
        entities
            .into_iter()
            .filter(|e| self.matches(e.as_ref()))
            .collect()
    }
}

impl AsRef<Entity> for Entity {
    fn as_ref(&self) -> &Entity {
        self
    }
}

fn text_matches(haystack: &str, lowered_term: &str, mode: MatchMode) -> bool {
    let haystack = haystack.to_lowercase();
    match mode {
        MatchMode::Substring => haystack.contains(lowered_term),
        MatchMode::Prefix => haystack.starts_with(lowered_term),
    }
}
