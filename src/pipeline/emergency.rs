//! Emergency red-flag detection.
//!
//! Runs before scope classification. A small fixed set of phrases that
//! indicate a possible medical emergency short-circuits the whole pipeline:
//! the user gets a fixed escalation template immediately instead of a
//! retrieval-backed answer. Deterministic phrase matching only, no model
//! involvement.

/// Fixed escalation template returned for red-flag queries.
pub const EMERGENCY_RESPONSE: &str = "\
This may be a medical emergency.\n\
Seek immediate in-person care now: call your local emergency number or go \
to the nearest emergency department.\n\
If the person is unconscious, has severe breathing trouble, or symptoms are \
rapidly worsening, call emergency services immediately.";

/// True when the normalized query contains a predefined emergency red flag.
pub fn is_emergency_query(normalized_text: &str) -> bool {
    let breathing_difficulty = normalized_text.contains("breathing difficulty")
        || normalized_text.contains("difficulty breathing")
        || normalized_text.contains("trouble breathing")
        || normalized_text.contains("shortness of breath");

    let facial_or_lip_swelling = normalized_text.contains("facial swelling")
        || normalized_text.contains("lip swelling");

    let loss_of_consciousness = normalized_text.contains("loss of consciousness")
        || normalized_text.contains("lost consciousness")
        || normalized_text.contains("unconscious");

    let repeated_vomiting = normalized_text.contains("repeated vomiting")
        || normalized_text.contains("vomiting repeatedly");
    let lethargy =
        normalized_text.contains("lethargy") || normalized_text.contains("lethargic");
    let vomiting_with_lethargy = repeated_vomiting && lethargy;

    breathing_difficulty
        || facial_or_lip_swelling
        || loss_of_consciousness
        || vomiting_with_lethargy
}
