//! Normalisation of the extraction payload.
//!
//! Terminal status responses carry the extraction either as an
//! already-structured JSON value or as a *string* that itself encodes JSON
//! (older backend versions serialise it twice). Callers should never have
//! to care which form arrived, so both collapse into one [`Extraction`]
//! with the original form kept in `raw`.
//!
//! A string that fails to decode is not an error for the job: the job still
//! succeeded, the payload is just unreadable. `parse_failed` marks that
//! case so consumers can render a parse-failure notice and fall back to the
//! raw payload.

use crate::api::ExtractionField;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalised extraction attached to a succeeded job.
///
/// Immutable once created; discarded on reset. Created at most once per
/// job, from the terminal status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// The payload exactly as received. A wire string stays a JSON string
    /// here even when it decoded cleanly.
    pub raw: Value,
    /// The decoded document, when one is available.
    pub parsed: Option<Value>,
    /// True when `raw` was a string that did not decode as JSON.
    pub parse_failed: bool,
    /// Decoder message behind `parse_failed`, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl Extraction {
    /// The value a consumer should render: the decoded document when there
    /// is one, otherwise the raw payload.
    pub fn parsed_or_raw(&self) -> &Value {
        self.parsed.as_ref().unwrap_or(&self.raw)
    }
}

/// Collapse the wire-side extraction field into its normalised form.
///
/// * absent field ⇒ `None` (no extraction for this job; distinct from a
///   parse failure)
/// * structured value ⇒ passed through unchanged
/// * string ⇒ decoded as JSON, with failure captured instead of propagated
pub fn normalize(field: Option<ExtractionField>) -> Option<Extraction> {
    match field {
        None => None,
        Some(ExtractionField::Structured(value)) => Some(Extraction {
            parsed: Some(value.clone()),
            raw: value,
            parse_failed: false,
            decode_error: None,
        }),
        Some(ExtractionField::Text(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => Some(Extraction {
                raw: Value::String(text),
                parsed: Some(parsed),
                parse_failed: false,
                decode_error: None,
            }),
            Err(err) => Some(Extraction {
                raw: Value::String(text),
                parsed: None,
                parse_failed: true,
                decode_error: Some(err.to_string()),
            }),
        },
    }
}
