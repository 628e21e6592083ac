//! Arbitration requests and verdict validation.
//!
//! An arbitrator sees exactly two candidates and must pick one of them. Its
//! reply is free text that should contain a JSON object; the object is
//! validated against `schema/arbitration_verdict.schema.json` and then
//! matched back to one of the two candidates. A verdict without a
//! justification is rejected.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::evidence::EvidenceRecord;
use crate::types::{Provenance, ScoredCandidate};

/// Embedded verdict schema (loaded at compile time).
const VERDICT_SCHEMA_JSON: &str = include_str!("../schema/arbitration_verdict.schema.json");

/// Compiled verdict validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from interpreting an arbitrator's reply.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    #[error("No JSON object in reply")]
    NoJson,

    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("Verdict failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Verdict names a concept outside the presented pair: {0}")]
    UnknownCandidate(String),

    #[error("Failed to load verdict schema: {0}")]
    SchemaUnavailable(String),
}

/// One side of an arbitration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationCandidate {
    pub identifier: String,
    pub canonical_name: String,
    pub similarity: f64,
    pub provenance: Provenance,
}

impl From<&ScoredCandidate> for ArbitrationCandidate {
    fn from(scored: &ScoredCandidate) -> Self {
        Self {
            identifier: scored.identifier().to_string(),
            canonical_name: scored.canonical_name().to_string(),
            similarity: scored.similarity,
            provenance: scored.provenance(),
        }
    }
}

/// What an arbitrator is asked to decide.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrationRequest {
    pub evidence: EvidenceRecord,
    pub leader: ArbitrationCandidate,
    pub runner_up: ArbitrationCandidate,
}

impl ArbitrationRequest {
    pub fn new(evidence: &EvidenceRecord, leader: &ScoredCandidate, runner_up: &ScoredCandidate) -> Self {
        Self {
            evidence: evidence.clone(),
            leader: leader.into(),
            runner_up: runner_up.into(),
        }
    }

    /// Both candidates, leader first.
    pub fn candidates(&self) -> [&ArbitrationCandidate; 2] {
        [&self.leader, &self.runner_up]
    }

    /// The presented candidate carrying `identifier`, if any.
    pub fn candidate(&self, identifier: &str) -> Option<&ArbitrationCandidate> {
        self.candidates()
            .into_iter()
            .find(|c| c.identifier == identifier.trim())
    }

    fn candidate_named(&self, name: &str) -> Option<&ArbitrationCandidate> {
        let name = name.trim();
        self.candidates()
            .into_iter()
            .find(|c| c.canonical_name.eq_ignore_ascii_case(name))
    }
}

/// A decision naming one of the two presented candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationVerdict {
    pub selected_identifier: String,
    pub justification: String,
}

impl ArbitrationVerdict {
    pub fn new(selected_identifier: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            selected_identifier: selected_identifier.into(),
            justification: justification.into(),
        }
    }

    /// Whether the verdict carries a non-blank justification.
    pub fn is_justified(&self) -> bool {
        !self.justification.trim().is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    identifier: Option<String>,

    #[serde(default)]
    name: Option<String>,

    reason: String,
}

fn get_validator() -> Result<&'static jsonschema::Validator, VerdictError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(VERDICT_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;
        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| VerdictError::SchemaUnavailable(e.clone()))
}

/// The outermost `{...}` span of `text`.
///
/// Markdown fences and prose around the object are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Validate a verdict value against the embedded schema.
pub fn validate_verdict_schema(value: &serde_json::Value) -> Result<(), VerdictError> {
    let validator = get_validator()?;
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(VerdictError::Schema(errors))
    }
}

/// Parse an arbitrator reply into a verdict over `request`'s candidates.
///
/// An identifier, when given, must be one of the two presented; otherwise
/// the name must equal one of their canonical names (ASCII case-insensitive).
pub fn parse_verdict(text: &str, request: &ArbitrationRequest) -> Result<ArbitrationVerdict, VerdictError> {
    let object = extract_json_object(text).ok_or(VerdictError::NoJson)?;
    let value: serde_json::Value =
        serde_json::from_str(object).map_err(|e| VerdictError::MalformedJson(e.to_string()))?;

    validate_verdict_schema(&value)?;

    let raw: RawVerdict =
        serde_json::from_value(value).map_err(|e| VerdictError::MalformedJson(e.to_string()))?;

    let selected = match (&raw.identifier, &raw.name) {
        (Some(identifier), _) => request
            .candidate(identifier)
            .ok_or_else(|| VerdictError::UnknownCandidate(identifier.clone()))?,
        (None, Some(name)) => request
            .candidate_named(name)
            .ok_or_else(|| VerdictError::UnknownCandidate(name.clone()))?,
        (None, None) => return Err(VerdictError::Schema(vec!["no selection".to_string()])),
    };

    Ok(ArbitrationVerdict::new(
        selected.identifier.clone(),
        raw.reason.trim(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceNormalizer, RawEntities, RawEntity};
    use crate::types::Candidate;

    fn scored(name: &str, id: &str, similarity: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                canonical_name: name.to_string(),
                identifier: id.to_string(),
                provenance: Provenance::Exact,
                raw_score: None,
            },
            similarity,
            position: 0,
        }
    }

    fn request() -> ArbitrationRequest {
        let evidence = EvidenceNormalizer::default().normalize(
            &RawEntities {
                drug_name: Some(RawEntity::text("Hydrocodone", 0.7)),
                ..Default::default()
            },
            None,
        );
        ArbitrationRequest::new(
            &evidence,
            &scored("hydrocodone bitartrate 5 MG Oral Tablet", "1000001", 0.86),
            &scored(
                "Acetaminophen 325 MG / Hydrocodone Bitartrate 5 MG Oral Tablet",
                "856999",
                0.80,
            ),
        )
    }

    #[test]
    fn test_fenced_reply_by_name() {
        let reply = "```json\n{\"name\": \"acetaminophen 325 mg / hydrocodone bitartrate 5 mg oral tablet\", \"reason\": \"label lists both ingredients\"}\n```";
        let verdict = parse_verdict(reply, &request()).unwrap();
        assert_eq!(verdict.selected_identifier, "856999");
        assert_eq!(verdict.justification, "label lists both ingredients");
    }

    #[test]
    fn test_reply_by_identifier() {
        let verdict = parse_verdict(
            r#"Answer: {"identifier": "1000001", "reason": "  single ingredient on label "}"#,
            &request(),
        )
        .unwrap();
        assert_eq!(verdict.selected_identifier, "1000001");
        assert_eq!(verdict.justification, "single ingredient on label");
        assert!(verdict.is_justified());
    }

    #[test]
    fn test_missing_or_blank_reason_rejected() {
        for reply in [
            r#"{"identifier": "1000001"}"#,
            r#"{"identifier": "1000001", "reason": ""}"#,
            r#"{"identifier": "1000001", "reason": " \n\t "}"#,
            r#"{"identifier": "1000001", "reason": null}"#,
        ] {
            assert!(
                matches!(parse_verdict(reply, &request()), Err(VerdictError::Schema(_))),
                "{reply}"
            );
        }
        assert!(!ArbitrationVerdict::new("1000001", "  ").is_justified());
    }

    #[test]
    fn test_third_candidate_rejected() {
        let err = parse_verdict(
            r#"{"identifier": "42", "name": "Aspirin", "reason": "common"}"#,
            &request(),
        )
        .unwrap_err();
        assert_eq!(err, VerdictError::UnknownCandidate("42".to_string()));

        let err = parse_verdict(
            r#"{"name": "Oxycodone 5 MG Oral Tablet", "reason": "opioid"}"#,
            &request(),
        )
        .unwrap_err();
        assert!(matches!(err, VerdictError::UnknownCandidate(_)));
    }

    #[test]
    fn test_schema_violations() {
        assert!(matches!(
            parse_verdict(r#"{"reason": "unsure"}"#, &request()),
            Err(VerdictError::Schema(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"name": 42, "reason": "numeric"}"#, &request()),
            Err(VerdictError::Schema(_))
        ));
    }

    #[test]
    fn test_no_json() {
        assert_eq!(
            parse_verdict("I cannot decide.", &request()),
            Err(VerdictError::NoJson)
        );
        assert!(matches!(
            parse_verdict("{name: oops}", &request()),
            Err(VerdictError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("x {\"a\": {}} y"), Some("{\"a\": {}}"));
        assert_eq!(extract_json_object("} {"), None);
    }
}
