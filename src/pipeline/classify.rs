//! Scope classification, the first gate.
//!
//! Decides whether a query belongs to the medical domain the corpus covers
//! before any retrieval happens. Out-of-scope queries refuse early, which
//! saves an embedding call and keeps the corpus from being searched for
//! unrelated or unsafe topics.

use std::sync::LazyLock;

use regex::Regex;

use super::types::Classification;

/// Vocabulary the corpus actually covers: infant feeding, allergy and
/// general symptom/management language. Substring match against the
/// normalized query.
const SCOPE_MARKERS: &[&str] = &[
    "allerg",
    "intoleran",
    "milk",
    "dairy",
    "lactose",
    "protein",
    "formula",
    "breastfeed",
    "breast milk",
    "feeding",
    "weaning",
    "nutrition",
    "diet",
    "symptom",
    "rash",
    "hives",
    "eczema",
    "reflux",
    "vomit",
    "diarrh",
    "constipation",
    "stool",
    "blood",
    "colic",
    "wheez",
    "cough",
    "swelling",
    "reaction",
    "diagnos",
    "treatment",
    "medication",
    "dose",
    "doctor",
    "pediatric",
    "paediatric",
    "clinician",
    "infant",
    "baby",
    "toddler",
    "child",
    "cmpa",
    "anaphyla",
    "elimination",
    "reintroduc",
    "red flag",
    "emergency",
];

/// Topics the pipeline must never search the corpus for, even when the
/// query also mentions a medical term.
static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(stock|invest(ing|ment)?|bitcoin|crypto|lottery|gambling)\b").unwrap(),
        Regex::new(r"(?i)\b(python|javascript|rust|source code|program(ming)?|compile)\b").unwrap(),
        Regex::new(r"(?i)\b(football|soccer|basketball|premier league|world cup)\b").unwrap(),
        Regex::new(r"(?i)\b(election|president|parliament|politic\w*)\b").unwrap(),
        Regex::new(r"(?i)\bweather\b").unwrap(),
        Regex::new(r"(?i)\b(write|draft)\s+(my|an?)\s+(essay|homework|assignment)\b").unwrap(),
    ]
});

/// Classify a normalized query as in scope or not.
///
/// Pure over the query text; the decision and its reason go straight into
/// the audit trail.
pub fn classify(normalized_text: &str) -> Classification {
    if let Some(pattern) = BLOCKED_PATTERNS.iter().find(|p| p.is_match(normalized_text)) {
        return Classification {
            in_scope: false,
            reason: format!("blocked_topic: {}", pattern.as_str()),
        };
    }

    match SCOPE_MARKERS.iter().find(|m| normalized_text.contains(*m)) {
        Some(marker) => Classification {
            in_scope: true,
            reason: format!("scope_marker: {marker}"),
        },
        None => Classification {
            in_scope: false,
            reason: "no_scope_marker".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medical_query_is_in_scope() {
        let c = classify("what are the symptoms of cow milk protein allergy?");
        assert!(c.in_scope);
        assert!(c.reason.starts_with("scope_marker"));
    }

    #[test]
    fn feeding_query_is_in_scope() {
        assert!(classify("which formula is safe for my baby?").in_scope);
    }

    #[test]
    fn unrelated_query_is_out_of_scope() {
        let c = classify("who won the world cup in 2022?");
        assert!(!c.in_scope);
    }

    #[test]
    fn no_marker_query_is_out_of_scope() {
        let c = classify("tell me a joke about penguins");
        assert!(!c.in_scope);
        assert_eq!(c.reason, "no_scope_marker");
    }

    #[test]
    fn blocked_topic_wins_over_scope_marker() {
        // Mentions "milk" but is an investment question.
        let c = classify("should i invest in milk futures?");
        assert!(!c.in_scope);
        assert!(c.reason.starts_with("blocked_topic"));
    }

    #[test]
    fn classification_does_not_mutate_input() {
        let text = "is eczema related to dairy?";
        classify(text);
        assert_eq!(text, "is eczema related to dairy?");
    }
}
