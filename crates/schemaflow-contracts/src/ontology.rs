//! Promotion-related fields carried by an ontology entity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    Inferred,
    Manual,
}

/// The promotion-related fields of an `OntologyEntity`, kept as a standalone
/// struct so the promotion scorer (§4.H) can operate on it without pulling
/// in the rest of the entity's schema/column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionFields {
    pub source: EntitySource,
    pub is_promoted: bool,
    pub promotion_score: Option<u32>,
    pub promotion_reasons: Vec<String>,
}

impl PromotionFields {
    pub fn inferred() -> Self {
        Self {
            source: EntitySource::Inferred,
            is_promoted: false,
            promotion_score: None,
            promotion_reasons: Vec::new(),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.source, EntitySource::Manual)
    }
}
