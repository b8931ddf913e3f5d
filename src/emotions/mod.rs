//! Emotion extraction from free-text model output.
//!
//! The emotion-extraction prompt asks the model for a bracketed list such as
//! `[joy:1 (high), fear:0 (none), calm:1 (moderate)]`. The model is not bound
//! to that shape, so parsing is tolerant: anything that does not fit is
//! dropped and the turn carries on with fewer records.
//!
//! # Grammar
//!
//! ```text
//! "[" <fragment> ("," " " <fragment>)* "]"
//! fragment        := <label> ":" <intensity-token> (" " <note-token>)?
//! intensity-token := digit+ | non-digit-text
//! note-token      := "(" <text> ")" | <text>
//! ```
//!
//! [`extract_emotions`] is the only entry point the rest of the crate needs.
//! [`extract_emotions_report`] produces the same records along with what was
//! discarded and which kept fragments strayed from the grammar, for logging.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator between fragments inside the brackets.
pub const FRAGMENT_SEPARATOR: &str = ", ";

/// Emotion labels the extraction prompt asks for.
///
/// Parsing does not restrict labels to this list.
pub const EMOTION_VOCABULARY: &[&str] = &[
    "joy",
    "fear",
    "anger",
    "sadness",
    "calm",
    "anxiety",
    "excitement",
    "confusion",
    "love",
    "disgust",
];

static FRAGMENT_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^:]*:[0-9]+(?: \([^() ]*\)| [^ ()]+)?$").unwrap());

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One `(emotion, intensity, note)` triple pulled from a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionRecord {
    /// Label as written by the model, e.g. `"joy"`.
    pub emotion: String,
    /// Intensity flag; `0` when the token was missing or not numeric.
    pub intensity: u64,
    /// Qualifier such as `"high"`; empty when absent.
    pub note: String,
}

impl EmotionRecord {
    pub fn new(emotion: impl Into<String>, intensity: u64, note: impl Into<String>) -> Self {
        Self {
            emotion: emotion.into(),
            intensity,
            note: note.into(),
        }
    }

    /// Whether the label is one of [`EMOTION_VOCABULARY`].
    pub fn is_known_emotion(&self) -> bool {
        EMOTION_VOCABULARY.contains(&self.emotion.as_str())
    }

    /// The note, or `None` when empty.
    pub fn note(&self) -> Option<&str> {
        if self.note.is_empty() {
            None
        } else {
            Some(&self.note)
        }
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Why a fragment produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Splitting on `:` did not give exactly a label and a remainder.
    ColonCount,
}

/// How the intensity token was turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityPolicy {
    /// The token was all ASCII digits. Values past `u64::MAX` saturate.
    Parsed,
    /// The token was empty or non-numeric; intensity is 0.
    DefaultToZero,
}

/// Parse an intensity token under the digits-or-zero policy.
pub fn parse_intensity(token: &str) -> (u64, IntensityPolicy) {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return (0, IntensityPolicy::DefaultToZero);
    }
    // Only overflow can fail here.
    let value = token.parse::<u64>().unwrap_or(u64::MAX);
    (value, IntensityPolicy::Parsed)
}

/// Whether a fragment matches the grammar in a form the splitter reads
/// without loss (single-word notes only).
pub fn fragment_conforms(fragment: &str) -> bool {
    FRAGMENT_GRAMMAR.is_match(fragment)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A record together with how it was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFragment {
    pub record: EmotionRecord,
    pub intensity_policy: IntensityPolicy,
    /// `false` when the fragment strays from the grammar or would be read
    /// lossily, e.g. a multi-word note cut down to its first word.
    pub conforms: bool,
}

/// A fragment that produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscardedFragment {
    pub fragment: String,
    pub reason: DiscardReason,
}

/// Full outcome of parsing one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub parsed: Vec<ParsedFragment>,
    pub discarded: Vec<DiscardedFragment>,
}

impl ExtractionReport {
    /// The records, in source order.
    pub fn records(&self) -> Vec<EmotionRecord> {
        self.parsed.iter().map(|p| p.record.clone()).collect()
    }

    pub fn into_records(self) -> Vec<EmotionRecord> {
        self.parsed.into_iter().map(|p| p.record).collect()
    }

    /// Fragments that were kept but did not match the grammar.
    pub fn non_conforming(&self) -> impl Iterator<Item = &ParsedFragment> {
        self.parsed.iter().filter(|p| !p.conforms)
    }

    /// True when nothing was discarded and every kept fragment conforms.
    pub fn is_clean(&self) -> bool {
        self.discarded.is_empty() && self.parsed.iter().all(|p| p.conforms)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a bracketed emotion list into records.
///
/// Returns an empty vector for absent or empty input and for input that does
/// not start with `[`. Malformed fragments are skipped. Never fails.
///
/// ```
/// use dreamdiary::emotions::{extract_emotions, EmotionRecord};
///
/// let records = extract_emotions(Some("[joy:1 (high), fear:0 (none)]"));
/// assert_eq!(records[0], EmotionRecord::new("joy", 1, "high"));
/// assert_eq!(records.len(), 2);
/// ```
pub fn extract_emotions(raw: Option<&str>) -> Vec<EmotionRecord> {
    extract_emotions_report(raw).into_records()
}

/// Parse a bracketed emotion list, keeping diagnostics.
pub fn extract_emotions_report(raw: Option<&str>) -> ExtractionReport {
    let mut report = ExtractionReport::default();

    let text = match raw {
        Some(text) if text.starts_with('[') => text,
        _ => return report,
    };

    let interior = text.trim_matches(|c: char| c == '[' || c == ']');
    for fragment in interior.split(FRAGMENT_SEPARATOR) {
        match parse_fragment(fragment) {
            Ok(parsed) => report.parsed.push(parsed),
            Err(reason) => report.discarded.push(DiscardedFragment {
                fragment: fragment.to_string(),
                reason,
            }),
        }
    }

    report
}

fn parse_fragment(fragment: &str) -> Result<ParsedFragment, DiscardReason> {
    let parts: Vec<&str> = fragment.split(':').collect();
    let (label, rest) = match parts.as_slice() {
        [label, rest] => (*label, *rest),
        _ => return Err(DiscardReason::ColonCount),
    };

    // Single-space split: "1  (high)" yields an empty second token.
    let mut tokens = rest.split(' ');
    let (intensity, intensity_policy) = parse_intensity(tokens.next().unwrap_or(""));
    let note = tokens
        .next()
        .map(|t| t.trim_matches(|c: char| c == '(' || c == ')'))
        .unwrap_or("");

    Ok(ParsedFragment {
        record: EmotionRecord::new(label, intensity, note),
        intensity_policy,
        conforms: fragment_conforms(fragment),
    })
}
