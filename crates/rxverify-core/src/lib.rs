//! # rxverify-core
//!
//! Deterministic drug identity resolution logic.
//!
//! This crate holds everything in the candidate resolution engine that does
//! not touch the network:
//! - evidence normalization of noisy OCR/extraction output
//! - NDC interpretation of decoded barcode values
//! - candidate merging and formulation filtering
//! - token-set fuzzy scoring
//! - the post-scoring guards of the resolution state machine
//! - validation of arbitration verdicts
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same evidence and lookup rows always produce the same ranking
//! 2. **No I/O**: Lookups and arbitration live in `rxverify-runtime`
//! 3. **Never fails on bad evidence**: Unusable fields are simply absent
//!
//! ## Example
//!
//! ```rust,ignore
//! use rxverify_core::{assess, merge_textual, Assessment, EvidenceNormalizer, FuzzyScorer};
//!
//! let evidence = EvidenceNormalizer::default().normalize(&raw_entities, None);
//! let candidates = merge_textual(exact_rows, approximate_rows);
//! let ranked = FuzzyScorer::new().score(&evidence, &candidates);
//!
//! match assess(&ranked, &ResolutionConfig::default()) {
//!     Assessment::Direct(winner) => println!("{}", winner.canonical_name()),
//!     Assessment::Ambiguous { leader, runner_up } => { /* arbitrate */ }
//!     Assessment::NoAcceptable { .. } => println!("unresolved"),
//! }
//! ```

pub mod barcode;
pub mod candidates;
pub mod config;
pub mod evidence;
pub mod patterns;
pub mod resolution;
pub mod scoring;
pub mod types;
pub mod verdict;

// Re-export main types at crate root
pub use barcode::{ndc_candidates, Ndc11};
pub use candidates::{barcode_candidate, filter_formulation, formulation_mismatch, merge_textual};
pub use config::{ConfigError, ResolutionConfig};
pub use evidence::{
    BarcodeReading, EntityValue, EvidenceDocument, EvidenceField, EvidenceNormalizer,
    EvidenceRecord, GuessText, RawEntities, RawEntity, RawOcr,
};
pub use resolution::{
    assess, Assessment, LookupTier, ResolutionIssue, ResolutionState, ResolutionTrace,
};
pub use scoring::{token_set_similarity, FuzzyScorer};
pub use types::{
    ApproximateHit, Candidate, ConceptHit, Provenance, ResolutionPath, ScoredCandidate,
    VerificationResult,
};
pub use verdict::{
    parse_verdict, ArbitrationCandidate, ArbitrationRequest, ArbitrationVerdict, VerdictError,
};
