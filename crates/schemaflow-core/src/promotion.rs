//! Deterministic entity promotion scorer (spec §4.H).
//!
//! Operates over a snapshot of the relationship graph; manually-sourced
//! entities are counted in the returned totals but never rescored.

use std::collections::{HashMap, HashSet};

use schemaflow_contracts::{EntitySource, PromotionFields};
use uuid::Uuid;

const PROMOTION_THRESHOLD: u32 = 50;

/// `score >= 50` promotes (spec §4.H); boundary is inclusive.
fn is_promoted(score: u32) -> bool {
    score >= PROMOTION_THRESHOLD
}

/// A single accepted inbound edge to an entity, as seen by the scorer.
/// `source_column` is the column name on the *other side* of the edge —
/// distinct names across edges count as distinct inbound "roles".
#[derive(Debug, Clone)]
pub struct InboundEdge {
    pub source_column: String,
    pub has_alias: bool,
}

/// One entity under consideration, with its accumulated inbound edges.
#[derive(Debug, Clone)]
pub struct ScorableEntity {
    pub id: Uuid,
    pub promotion: PromotionFields,
    pub inbound_edges: Vec<InboundEdge>,
}

#[derive(Debug, Clone, Default)]
pub struct PromotionSummary {
    pub promoted: u32,
    pub demoted: u32,
}

/// Scores every entity in `entities`, mutating `promotion.is_promoted`,
/// `promotion_score`, and `promotion_reasons` in place for inferred
/// entities, and returns the promoted/demoted totals across all entities
/// (including manual ones, which are counted but not rescored).
pub fn score_entities(entities: &mut [ScorableEntity]) -> PromotionSummary {
    let mut summary = PromotionSummary::default();

    for entity in entities.iter_mut() {
        if entity.promotion.is_manual() {
            if entity.promotion.is_promoted {
                summary.promoted += 1;
            } else {
                summary.demoted += 1;
            }
            continue;
        }

        let (score, reasons) = score_one(&entity.inbound_edges);
        let promoted = is_promoted(score);

        entity.promotion.promotion_score = Some(score);
        entity.promotion.promotion_reasons = reasons;
        entity.promotion.is_promoted = promoted;

        if promoted {
            summary.promoted += 1;
        } else {
            summary.demoted += 1;
        }
    }

    summary
}

fn score_one(edges: &[InboundEdge]) -> (u32, Vec<String>) {
    let mut score = 0u32;
    let mut reasons = Vec::new();

    let inbound_count = edges.len();
    match inbound_count {
        n if n >= 5 => {
            score += 30;
            reasons.push(format!("hub: {n} inbound relationships"));
        }
        3 | 4 => {
            score += 20;
            reasons.push(format!("{inbound_count} inbound relationships"));
        }
        1 | 2 => {
            score += 10;
            reasons.push(format!("{inbound_count} inbound relationship(s)"));
        }
        _ => {}
    }

    let distinct_roles: HashSet<&str> = edges.iter().map(|e| e.source_column.as_str()).collect();
    if distinct_roles.len() >= 2 {
        score += 25;
        reasons.push(format!("{} distinct inbound roles", distinct_roles.len()));
    }

    if edges.iter().any(|e| e.has_alias) {
        score += 10;
        reasons.push("has an alias".to_string());
    }

    (score, reasons)
}

/// Builds [`ScorableEntity`] inbound-edge lists from a flat list of
/// `(target_entity_id, source_column_name)` accepted-relationship pairs,
/// the shape the ontology repository would hand the scorer after joining
/// `SchemaRelationship` rows to their target entity.
pub fn group_inbound_edges(edges: &[(Uuid, String)]) -> HashMap<Uuid, Vec<InboundEdge>> {
    let mut grouped: HashMap<Uuid, Vec<InboundEdge>> = HashMap::new();
    for (target, source_column) in edges {
        grouped.entry(*target).or_default().push(InboundEdge {
            source_column: source_column.clone(),
            has_alias: false,
        });
    }
    grouped
}
