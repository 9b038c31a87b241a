//! Deterministic clarification-question generator (spec §4.I).
//!
//! Runs over scanned column statistics with no LLM involvement: a
//! high-NULL-rate rule and a cryptic-enum rule, each producing a
//! `GeneratedQuestion` the caller surfaces to the user during ontology
//! review.

use serde::{Deserialize, Serialize};

const HIGH_NULL_THRESHOLD: f64 = 0.80;
const CRYPTIC_MAX_DISTINCT: usize = 20;
const CRYPTIC_DISPLAY_LIMIT: usize = 5;

const KNOWN_OPTIONAL_EXACT: &[&str] = &["deleted_at", "archived_at", "notes", "middle_name"];
const KNOWN_OPTIONAL_SUFFIXES: &[&str] = &["_at", "_on", "_notes", "_description", "_url"];
const KNOWN_OPTIONAL_PREFIXES: &[&str] = &["old_", "legacy_", "alt_", "secondary_", "custom_"];

const BOOLEAN_LIKE_PAIRS: &[[&str; 2]] = &[
    ["true", "false"],
    ["y", "n"],
    ["1", "0"],
    ["on", "off"],
    ["active", "inactive"],
    ["enabled", "disabled"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    DataQuality,
    Enumeration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedQuestion {
    pub kind: QuestionKind,
    pub table: String,
    pub column: String,
    pub text: String,
    pub priority: u8,
    pub required: bool,
}

/// Scanned statistics for one column, as gathered by the schema
/// discoverer and persisted in `WorkflowEntityState::state_data.gathered`.
#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub table: String,
    pub column: String,
    pub row_count: u64,
    pub null_count: u64,
    pub distinct_count: u64,
    pub sample_values: Vec<String>,
}

/// Generates clarification questions for one column's statistics.
/// Returns at most one question per rule (0, 1, or 2 entries).
pub fn generate_questions(stats: &ColumnStats) -> Vec<GeneratedQuestion> {
    let mut questions = Vec::new();

    if let Some(q) = high_null_question(stats) {
        questions.push(q);
    }
    if let Some(q) = cryptic_enum_question(stats) {
        questions.push(q);
    }

    questions
}

fn high_null_question(stats: &ColumnStats) -> Option<GeneratedQuestion> {
    if stats.row_count == 0 {
        return None;
    }
    let rate = stats.null_count as f64 / stats.row_count as f64;
    if rate <= HIGH_NULL_THRESHOLD {
        return None;
    }
    if is_known_optional(&stats.column) {
        return None;
    }

    Some(GeneratedQuestion {
        kind: QuestionKind::DataQuality,
        table: stats.table.clone(),
        column: stats.column.clone(),
        text: format!(
            "Column `{}.{}` is {:.0}% NULL — is this expected, or does it indicate a data quality issue?",
            stats.table,
            stats.column,
            rate * 100.0
        ),
        priority: 3,
        required: false,
    })
}

fn is_known_optional(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    KNOWN_OPTIONAL_EXACT.contains(&lower.as_str())
        || KNOWN_OPTIONAL_SUFFIXES.iter().any(|suf| lower.ends_with(suf))
        || KNOWN_OPTIONAL_PREFIXES.iter().any(|pre| lower.starts_with(pre))
}

fn cryptic_enum_question(stats: &ColumnStats) -> Option<GeneratedQuestion> {
    if stats.distinct_count == 0 || stats.distinct_count as usize > CRYPTIC_MAX_DISTINCT {
        return None;
    }
    if is_boolean_like(&stats.sample_values) {
        return None;
    }

    let cryptic_count = stats.sample_values.iter().filter(|v| is_cryptic_value(v)).count();
    let total = stats.sample_values.len();
    if total == 0 {
        return None;
    }
    let majority = cryptic_count * 2 >= total;
    if !(majority || cryptic_count >= 3) {
        return None;
    }

    Some(GeneratedQuestion {
        kind: QuestionKind::Enumeration,
        table: stats.table.clone(),
        column: stats.column.clone(),
        text: format!(
            "Column `{}.{}` looks like a coded enumeration ({}) — what do these values mean?",
            stats.table,
            stats.column,
            format_sample_values(&stats.sample_values)
        ),
        priority: 1,
        required: true,
    })
}

fn is_boolean_like(values: &[String]) -> bool {
    if values.len() != 2 {
        return false;
    }
    let lower: Vec<String> = values.iter().map(|v| v.to_ascii_lowercase()).collect();
    BOOLEAN_LIKE_PAIRS.iter().any(|pair| {
        (lower[0] == pair[0] && lower[1] == pair[1]) || (lower[0] == pair[1] && lower[1] == pair[0])
    })
}

/// A value is "cryptic" if it is a single letter, a numeric code of at
/// most 3 digits, an uppercase abbreviation of length 2–3, or a mixed
/// alphanumeric string of at most 3 characters.
pub fn is_cryptic_value(value: &str) -> bool {
    let v = value.trim();
    if v.is_empty() {
        return false;
    }

    let is_single_letter = v.chars().count() == 1 && v.chars().next().unwrap().is_alphabetic();
    let is_numeric_code = v.len() <= 3 && !v.is_empty() && v.chars().all(|c| c.is_ascii_digit());
    let is_upper_abbrev = (2..=3).contains(&v.chars().count())
        && v.chars().all(|c| c.is_ascii_uppercase());
    let is_mixed_alnum_short = v.chars().count() <= 3
        && v.chars().all(|c| c.is_alphanumeric())
        && v.chars().any(|c| c.is_ascii_digit())
        && v.chars().any(|c| c.is_alphabetic());

    is_single_letter || is_numeric_code || is_upper_abbrev || is_mixed_alnum_short
}

fn format_sample_values(values: &[String]) -> String {
    let shown: Vec<String> = values.iter().take(CRYPTIC_DISPLAY_LIMIT).map(|v| format!("'{v}'")).collect();
    let mut text = shown.join(", ");
    if values.len() > CRYPTIC_DISPLAY_LIMIT {
        text.push_str(&format!(" (and {} more)", values.len() - CRYPTIC_DISPLAY_LIMIT));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(column: &str, row_count: u64, null_count: u64, samples: Vec<&str>) -> ColumnStats {
        ColumnStats {
            table: "t".to_string(),
            column: column.to_string(),
            row_count,
            null_count,
            distinct_count: samples.len() as u64,
            sample_values: samples.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn is_cryptic_value_law() {
        assert!(is_cryptic_value("A"));
        assert!(!is_cryptic_value("hello"));
        assert!(is_cryptic_value("USA"));
        assert!(!is_cryptic_value("ABCD"));
    }

    #[test]
    fn cryptic_enum_detection_scenario() {
        let s = stats("status", 1000, 0, vec!["A", "B", "C", "D"]);
        let questions = generate_questions(&s);
        let q = questions
            .iter()
            .find(|q| q.kind == QuestionKind::Enumeration)
            .expect("expected an enumeration question");
        assert!(q.required);
        assert_eq!(q.priority, 1);
        assert!(q.text.contains("'A', 'B', 'C', 'D'"));
    }

    #[test]
    fn high_null_ignored_for_known_optional() {
        let s = stats("deleted_at", 1000, 950, vec!["2024-01-01"]);
        let questions = generate_questions(&s);
        assert!(questions.iter().all(|q| q.kind != QuestionKind::DataQuality));
    }

    #[test]
    fn high_null_threshold_boundary_does_not_fire_at_exactly_point_eight() {
        let s = stats("weird_col", 1000, 800, vec!["x"]);
        let questions = generate_questions(&s);
        assert!(questions.iter().all(|q| q.kind != QuestionKind::DataQuality));
    }

    #[test]
    fn high_null_fires_above_threshold_for_unknown_column() {
        let s = stats("weird_col", 1000, 801, vec!["x"]);
        let questions = generate_questions(&s);
        assert!(questions.iter().any(|q| q.kind == QuestionKind::DataQuality));
    }

    #[test]
    fn boolean_like_pairs_are_not_cryptic_enums() {
        for pair in [["true", "false"], ["Y", "N"], ["1", "0"], ["Active", "Inactive"]] {
            let s = stats("flag", 1000, 0, pair.to_vec());
            let questions = generate_questions(&s);
            assert!(
                questions.iter().all(|q| q.kind != QuestionKind::Enumeration),
                "pair {pair:?} should not be flagged"
            );
        }
    }

    #[test]
    fn distinct_count_over_twenty_is_not_cryptic_enum() {
        let samples: Vec<&str> = vec![
            "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R",
            "S", "T", "U",
        ];
        let s = stats("code", 1000, 0, samples);
        let questions = generate_questions(&s);
        assert!(questions.iter().all(|q| q.kind != QuestionKind::Enumeration));
    }

    #[test]
    fn display_truncates_to_five_with_and_n_more() {
        let s = stats("code", 1000, 0, vec!["A", "B", "C", "D", "E", "F", "G"]);
        let questions = generate_questions(&s);
        let q = questions.iter().find(|q| q.kind == QuestionKind::Enumeration).unwrap();
        assert!(q.text.contains("(and 2 more)"));
    }

    #[test]
    fn minority_cryptic_values_but_at_least_three_still_fires() {
        // 7 samples, 3 cryptic (< 50%) -> still fires because count >= 3.
        let s = stats("mixed", 1000, 0, vec!["A1", "B2", "C3", "pending", "archived", "closed", "waiting"]);
        let questions = generate_questions(&s);
        assert!(questions.iter().any(|q| q.kind == QuestionKind::Enumeration));
    }
}
