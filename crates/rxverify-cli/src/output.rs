//! The verified document printed by `resolve` and `batch`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use rxverify_core::{
    BarcodeReading, EvidenceDocument, RawEntities, ResolutionIssue, ResolutionPath,
    ResolutionState, VerificationResult,
};
use rxverify_runtime::ResolutionOutcome;

/// How the verification was reached.
#[derive(Debug, Serialize)]
pub struct ResolutionReport {
    pub path: ResolutionPath,
    pub states: Vec<ResolutionState>,
    pub issues: Vec<ResolutionIssue>,
}

/// One input document with its verification attached.
#[derive(Debug, Serialize)]
pub struct VerifiedDocument {
    pub document_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub extracted_entities: RawEntities,
    pub barcode: Option<BarcodeReading>,
    pub verification: VerificationResult,
    pub resolution: ResolutionReport,
}

impl VerifiedDocument {
    pub fn new(document: EvidenceDocument, outcome: ResolutionOutcome) -> Self {
        let resolution = ResolutionReport {
            path: outcome.path(),
            states: outcome.trace.states().to_vec(),
            issues: outcome.trace.issues().to_vec(),
        };
        Self {
            document_id: Uuid::new_v4().to_string(),
            timestamp_utc: Utc::now(),
            extracted_entities: document.extracted_entities,
            barcode: document.barcode,
            verification: outcome.result,
            resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxverify_core::ResolutionTrace;

    #[test]
    fn test_unresolved_document_shape() {
        let mut trace = ResolutionTrace::new();
        trace.enter(ResolutionState::BarcodeCheck);
        trace.enter(ResolutionState::TextLookup);
        trace.note(ResolutionIssue::EvidenceInsufficient);
        trace.enter(ResolutionState::Unresolved);
        let outcome = ResolutionOutcome {
            result: VerificationResult::unresolved(),
            trace,
        };

        let value = serde_json::to_value(VerifiedDocument::new(EvidenceDocument::default(), outcome)).unwrap();

        assert_eq!(value["verification"]["rxnorm_cui"], serde_json::Value::Null);
        assert_eq!(value["verification"]["match_score"], 0.0);
        assert_eq!(value["resolution"]["path"], "UNRESOLVED");
        assert_eq!(value["resolution"]["states"][1], "BARCODE_CHECK");
        assert_eq!(value["resolution"]["states"][3], "UNRESOLVED");
        assert_eq!(value["resolution"]["issues"][0]["kind"], "evidence_insufficient");
        assert_eq!(value["document_id"].as_str().unwrap().len(), 36);
    }
}
