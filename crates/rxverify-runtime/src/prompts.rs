//! Prompts for LLM arbitration.
//!
//! The system prompt is static so providers can cache it; the user message
//! carries the two candidates and the label evidence as JSON.

use rxverify_core::ArbitrationRequest;
use serde_json::json;

use crate::providers::ChatMessage;

/// System prompt for choosing between two nomenclature concepts.
pub const ARBITRATION_SYSTEM_PROMPT: &str = r#"
You are a clinical medication normalization assistant.

You are given evidence read from a medication label (OCR text and extracted
fields) and exactly TWO candidate concepts from the RxNorm nomenclature.
Select the SINGLE candidate the label most plausibly denotes.

## Rules
1. Prefer candidates whose ingredients are a SUBSET of the label evidence
2. Penalize candidates that introduce ingredients the label does not show
3. Use indication clues on the label (e.g. "for pain", "for cough")
4. Use the dosage form (tablet vs liquid) and strength when the label shows them
5. Ignore brand noise, marketing text and pharmacy boilerplate
6. You may ONLY choose one of the two candidates you are given

## Output Format (JSON only, no prose)
{
  "identifier": "<identifier of the chosen candidate>",
  "name": "<exact name of the chosen candidate>",
  "reason": "<short justification>"
}
"#;

/// Ingredients recognized by name when describing candidates.
const KNOWN_INGREDIENTS: &[&str] = &[
    "acetaminophen",
    "hydrocodone",
    "ibuprofen",
    "amoxicillin",
    "clavulanate",
    "metformin",
    "paracetamol",
    "pseudoephedrine",
    "chlorpheniramine",
];

/// Active ingredients named in a concept name.
///
/// Known ingredients are matched by substring (`apap` counts as
/// acetaminophen). Names with none of them fall back to their
/// `/`, `,` or `+` separated parts longer than four characters.
pub fn infer_ingredients(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let mut found: Vec<String> = Vec::new();

    for ingredient in KNOWN_INGREDIENTS {
        if lower.contains(ingredient) {
            found.push((*ingredient).to_string());
        }
    }
    if lower.contains("apap") && !found.iter().any(|i| i == "acetaminophen") {
        found.push("acetaminophen".to_string());
    }

    if found.is_empty() {
        for part in lower.split(['/', ',', '+']) {
            let part = part.trim();
            if part.len() > 4 && !found.iter().any(|i| i == part) {
                found.push(part.to_string());
            }
        }
    }
    found
}

/// Coarse dosage form of a concept name: `tablet`, `liquid` or `unknown`.
pub fn infer_form(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("tablet") {
        "tablet"
    } else if lower.contains("suspension") || lower.contains("solution") {
        "liquid"
    } else {
        "unknown"
    }
}

/// Messages for one arbitration call.
pub fn arbitration_messages(request: &ArbitrationRequest) -> Vec<ChatMessage> {
    let evidence = &request.evidence;

    let candidates: Vec<_> = request
        .candidates()
        .iter()
        .map(|c| {
            json!({
                "identifier": c.identifier,
                "name": c.canonical_name,
                "ingredients": infer_ingredients(&c.canonical_name),
                "form": infer_form(&c.canonical_name),
                "similarity": (c.similarity * 100.0).round() / 100.0,
            })
        })
        .collect();

    let label = json!({
        "drug_name": evidence.drug_name().map(|g| g.display()),
        "dosage": evidence.dosage().map(|g| g.display()),
        "manufacturer": evidence.manufacturer().map(|g| g.display()),
        "composition": evidence.composition().iter().map(|g| g.display()).collect::<Vec<_>>(),
        "ocr_text": evidence.context_text(),
    });

    let user = format!(
        "LABEL EVIDENCE:\n{}\n\nCANDIDATES:\n{}\n\nReturn ONLY the JSON object.",
        serde_json::to_string_pretty(&label).unwrap_or_default(),
        serde_json::to_string_pretty(&candidates).unwrap_or_default(),
    );

    vec![
        ChatMessage::system(ARBITRATION_SYSTEM_PROMPT.trim()),
        ChatMessage::user(user),
    ]
}
