//! Evidence normalization.
//!
//! Upstream extraction is heuristic and noisy. The normalizer turns whatever
//! it produced into an [`EvidenceRecord`]: trimmed, case-folded guesses with
//! low-quality ones dropped, and clamped per-field confidences. It never
//! fails; a missing or unusable field is simply absent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ResolutionConfig;
use crate::patterns::{collapse_whitespace, is_stopword, normalize_token};

/// Evidence fields that carry a confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceField {
    DrugName,
    Dosage,
    Manufacturer,
    Composition,
    Barcode,
}

impl fmt::Display for EvidenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvidenceField::DrugName => "drug_name",
            EvidenceField::Dosage => "dosage",
            EvidenceField::Manufacturer => "manufacturer",
            EvidenceField::Composition => "composition",
            EvidenceField::Barcode => "barcode",
        };
        f.write_str(name)
    }
}

/// Value of an extracted entity: a single string or a list (composition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Text(String),
    List(Vec<String>),
}

impl EntityValue {
    fn items(&self) -> Vec<&str> {
        match self {
            EntityValue::Text(text) => vec![text.as_str()],
            EntityValue::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// One entity guess from the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub value: EntityValue,

    #[serde(default)]
    pub confidence: Option<f64>,

    #[serde(default)]
    pub source: Option<String>,
}

impl RawEntity {
    /// A single-string guess.
    pub fn text(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            value: EntityValue::Text(value.into()),
            confidence: Some(confidence),
            source: None,
        }
    }

    /// A list guess (composition).
    pub fn list<I, S>(values: I, confidence: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            value: EntityValue::List(values.into_iter().map(Into::into).collect()),
            confidence: Some(confidence),
            source: None,
        }
    }
}

/// Raw extraction output, in the shape the extraction stage emits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntities {
    #[serde(default)]
    pub drug_name: Option<RawEntity>,

    #[serde(default)]
    pub dosage: Option<RawEntity>,

    #[serde(default)]
    pub manufacturer: Option<RawEntity>,

    #[serde(default)]
    pub composition: Option<RawEntity>,
}

/// Decoded barcode as reported by the barcode collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeReading {
    pub value: String,

    #[serde(default)]
    pub symbology: Option<String>,

    #[serde(default)]
    pub confidence: Option<f64>,
}

/// OCR output; only the full text is consumed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOcr {
    #[serde(default)]
    pub engine: Option<String>,

    #[serde(default)]
    pub full_text: String,
}

/// Everything the upstream stages produced for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDocument {
    #[serde(default)]
    pub extracted_entities: RawEntities,

    #[serde(default)]
    pub barcode: Option<BarcodeReading>,

    #[serde(default)]
    pub raw_ocr: Option<RawOcr>,
}

/// A normalized guess: display copy plus case-folded comparison copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuessText {
    display: String,
    folded: String,
}

impl GuessText {
    fn new(display: String) -> Self {
        let folded = display.to_lowercase();
        Self { display, folded }
    }

    /// Original-case text for display and lookups.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Case-folded text for comparisons.
    pub fn folded(&self) -> &str {
        &self.folded
    }
}

impl fmt::Display for GuessText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Uniform evidence for one image. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceRecord {
    drug_name: Option<GuessText>,
    dosage: Option<GuessText>,
    manufacturer: Option<GuessText>,
    composition: Vec<GuessText>,
    barcode: Option<String>,
    context_text: Option<String>,
    field_confidences: BTreeMap<EvidenceField, f64>,
}

impl EvidenceRecord {
    pub fn drug_name(&self) -> Option<&GuessText> {
        self.drug_name.as_ref()
    }

    pub fn dosage(&self) -> Option<&GuessText> {
        self.dosage.as_ref()
    }

    pub fn manufacturer(&self) -> Option<&GuessText> {
        self.manufacturer.as_ref()
    }

    pub fn composition(&self) -> &[GuessText] {
        &self.composition
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    /// Full label text, when OCR supplied it.
    pub fn context_text(&self) -> Option<&str> {
        self.context_text.as_deref()
    }

    pub fn confidence(&self, field: EvidenceField) -> Option<f64> {
        self.field_confidences.get(&field).copied()
    }

    pub fn field_confidences(&self) -> &BTreeMap<EvidenceField, f64> {
        &self.field_confidences
    }

    /// Term sent to the nomenclature service.
    pub fn lookup_term(&self) -> Option<&str> {
        self.drug_name.as_ref().map(GuessText::display)
    }

    /// Whether any source (barcode or drug name) can produce candidates.
    pub fn is_actionable(&self) -> bool {
        self.barcode.is_some() || self.drug_name.is_some()
    }
}

/// Builds [`EvidenceRecord`]s from raw collaborator output.
#[derive(Debug, Clone)]
pub struct EvidenceNormalizer {
    min_guess_len: usize,
}

impl Default for EvidenceNormalizer {
    fn default() -> Self {
        Self::from_config(&ResolutionConfig::default())
    }
}

impl EvidenceNormalizer {
    pub fn new(min_guess_len: usize) -> Self {
        Self {
            min_guess_len: min_guess_len.max(1),
        }
    }

    pub fn from_config(config: &ResolutionConfig) -> Self {
        Self::new(config.min_guess_len)
    }

    /// Normalize extraction output and an optional decoded barcode.
    pub fn normalize(&self, raw: &RawEntities, raw_barcode: Option<&str>) -> EvidenceRecord {
        let mut field_confidences = BTreeMap::new();

        let drug_name = self.single_guess(
            raw.drug_name.as_ref(),
            EvidenceField::DrugName,
            &mut field_confidences,
            |guess| !is_boilerplate(guess.folded()),
        );
        let dosage = self.single_guess(
            raw.dosage.as_ref(),
            EvidenceField::Dosage,
            &mut field_confidences,
            |_| true,
        );
        let manufacturer = self.single_guess(
            raw.manufacturer.as_ref(),
            EvidenceField::Manufacturer,
            &mut field_confidences,
            |_| true,
        );
        let composition = self.composition_guesses(raw.composition.as_ref(), &mut field_confidences);

        let barcode = raw_barcode
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        if barcode.is_some() {
            field_confidences.entry(EvidenceField::Barcode).or_insert(1.0);
        }

        tracing::trace!(
            drug_name = ?drug_name.as_ref().map(GuessText::display),
            barcode = ?barcode,
            "Evidence normalized"
        );

        EvidenceRecord {
            drug_name,
            dosage,
            manufacturer,
            composition,
            barcode,
            context_text: None,
            field_confidences,
        }
    }

    /// Normalize a full upstream document, including OCR text and barcode confidence.
    pub fn normalize_document(&self, document: &EvidenceDocument) -> EvidenceRecord {
        let barcode = document.barcode.as_ref().map(|b| b.value.as_str());
        let mut record = self.normalize(&document.extracted_entities, barcode);

        if record.barcode.is_some() {
            if let Some(confidence) = document
                .barcode
                .as_ref()
                .and_then(|b| b.confidence)
                .and_then(clamp_confidence)
            {
                record
                    .field_confidences
                    .insert(EvidenceField::Barcode, confidence);
            }
        }

        record.context_text = document
            .raw_ocr
            .as_ref()
            .map(|ocr| collapse_whitespace(&ocr.full_text))
            .filter(|text| !text.is_empty());

        record
    }

    fn single_guess(
        &self,
        entity: Option<&RawEntity>,
        field: EvidenceField,
        confidences: &mut BTreeMap<EvidenceField, f64>,
        accept: impl Fn(&GuessText) -> bool,
    ) -> Option<GuessText> {
        let entity = entity?;
        let guess = entity
            .value
            .items()
            .into_iter()
            .filter_map(|item| self.clean(item))
            .find(|guess| accept(guess))?;

        if let Some(confidence) = entity.confidence.and_then(clamp_confidence) {
            confidences.insert(field, confidence);
        }
        Some(guess)
    }

    fn composition_guesses(
        &self,
        entity: Option<&RawEntity>,
        confidences: &mut BTreeMap<EvidenceField, f64>,
    ) -> Vec<GuessText> {
        let Some(entity) = entity else {
            return Vec::new();
        };

        let mut guesses: Vec<GuessText> = Vec::new();
        for item in entity.value.items() {
            if let Some(guess) = self.clean(item) {
                if !guesses.iter().any(|g| g.folded == guess.folded) {
                    guesses.push(guess);
                }
            }
        }

        if !guesses.is_empty() {
            if let Some(confidence) = entity.confidence.and_then(clamp_confidence) {
                confidences.insert(EvidenceField::Composition, confidence);
            }
        }
        guesses
    }

    fn clean(&self, raw: &str) -> Option<GuessText> {
        let display = collapse_whitespace(raw);
        if display.chars().count() < self.min_guess_len {
            return None;
        }
        Some(GuessText::new(display))
    }
}

/// A guess made only of label boilerplate ("Take", "Tablets", "Rx").
fn is_boilerplate(folded: &str) -> bool {
    let tokens: Vec<String> = folded
        .split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect();
    !tokens.is_empty() && tokens.iter().all(|t| is_stopword(t))
}

fn clamp_confidence(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}
