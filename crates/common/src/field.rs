// Declared field constraints and content validation.
//
// Empty content is valid for every kind: fields are optional until a record
// is signed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::FieldId;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Field content violates the field's declared constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("field {field_id}: {reason}")]
pub struct ValidationError {
    pub field_id: FieldId,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field_id: FieldId, reason: impl Into<String>) -> Self {
        Self { field_id, reason: reason.into() }
    }
}

/// Declared kind of a field, including its constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Multi-line rich text.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
    },
    /// Single-line text.
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decimal_places: Option<u8>,
    },
    /// ISO `YYYY-MM-DD`.
    Date,
    /// Comma-separated selections out of `options`.
    Choice {
        options: Vec<String>,
        #[serde(default)]
        multiple: bool,
    },
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::String { .. } => "string",
            Self::Number { .. } => "number",
            Self::Date => "date",
            Self::Choice { .. } => "choice",
        }
    }

    pub fn validate(&self, field_id: FieldId, content: &str) -> Result<(), ValidationError> {
        if content.trim().is_empty() {
            return Ok(());
        }

        match self {
            Self::Text { max_len } => check_length(field_id, content, *max_len),
            Self::String { max_len } => {
                if content.contains(['\n', '\r']) {
                    return Err(ValidationError::new(field_id, "must be a single line"));
                }
                check_length(field_id, content, *max_len)
            }
            Self::Number { min, max, decimal_places } => {
                validate_number(field_id, content.trim(), *min, *max, *decimal_places)
            }
            Self::Date => NaiveDate::parse_from_str(content.trim(), DATE_FORMAT)
                .map(|_| ())
                .map_err(|_| ValidationError::new(field_id, "must be a date in YYYY-MM-DD form")),
            Self::Choice { options, multiple } => {
                let selections: Vec<&str> =
                    content.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
                if !multiple && selections.len() > 1 {
                    return Err(ValidationError::new(field_id, "only one option may be selected"));
                }
                match selections.iter().find(|s| !options.iter().any(|option| option == *s)) {
                    Some(unknown) => Err(ValidationError::new(
                        field_id,
                        format!("`{unknown}` is not one of the allowed options"),
                    )),
                    None => Ok(()),
                }
            }
        }
    }
}

fn check_length(
    field_id: FieldId,
    content: &str,
    max_len: Option<usize>,
) -> Result<(), ValidationError> {
    match max_len {
        Some(max) if content.chars().count() > max => Err(ValidationError::new(
            field_id,
            format!("must be at most {max} characters"),
        )),
        _ => Ok(()),
    }
}

fn validate_number(
    field_id: FieldId,
    raw: &str,
    min: Option<f64>,
    max: Option<f64>,
    decimal_places: Option<u8>,
) -> Result<(), ValidationError> {
    let value = raw
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ValidationError::new(field_id, "must be a number"))?;

    if let Some(min) = min.filter(|min| value < *min) {
        return Err(ValidationError::new(field_id, format!("must be at least {min}")));
    }
    if let Some(max) = max.filter(|max| value > *max) {
        return Err(ValidationError::new(field_id, format!("must be at most {max}")));
    }
    if let Some(places) = decimal_places {
        let mantissa = raw.split(['e', 'E']).next().unwrap_or(raw);
        let fraction = mantissa.split_once('.').map(|(_, fraction)| fraction.len()).unwrap_or(0);
        if fraction > usize::from(places) {
            return Err(ValidationError::new(
                field_id,
                format!("must have at most {places} decimal places"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_is_always_valid() {
        let kinds = [
            FieldKind::Date,
            FieldKind::Number { min: Some(1.0), max: None, decimal_places: None },
            FieldKind::Choice { options: vec!["a".into()], multiple: false },
        ];
        for kind in kinds {
            assert!(kind.validate(1, "").is_ok(), "{} should accept empty", kind.as_str());
            assert!(kind.validate(1, "   ").is_ok());
        }
    }

    #[test]
    fn text_respects_max_len_in_chars() {
        let kind = FieldKind::Text { max_len: Some(3) };
        assert!(kind.validate(1, "äöü").is_ok());
        let err = kind.validate(1, "abcd").unwrap_err();
        assert_eq!(err.field_id, 1);
        assert!(err.reason.contains("at most 3"));
    }

    #[test]
    fn string_rejects_newlines() {
        let kind = FieldKind::String { max_len: None };
        assert!(kind.validate(2, "one line").is_ok());
        assert!(kind.validate(2, "two\nlines").is_err());
    }

    #[test]
    fn number_checks_bounds_and_decimals() {
        let kind = FieldKind::Number { min: Some(0.0), max: Some(14.0), decimal_places: Some(2) };
        assert!(kind.validate(3, "7.25").is_ok());
        assert!(kind.validate(3, " 14 ").is_ok());
        assert!(kind.validate(3, "-1").unwrap_err().reason.contains("at least"));
        assert!(kind.validate(3, "14.5").unwrap_err().reason.contains("at most 14"));
        assert!(kind.validate(3, "7.255").unwrap_err().reason.contains("decimal places"));
        assert!(kind.validate(3, "seven").unwrap_err().reason.contains("number"));
        assert!(kind.validate(3, "NaN").is_err());
    }

    #[test]
    fn date_requires_iso_format() {
        assert!(FieldKind::Date.validate(4, "2026-10-18").is_ok());
        assert!(FieldKind::Date.validate(4, "18/10/2026").is_err());
        assert!(FieldKind::Date.validate(4, "2026-02-30").is_err());
    }

    #[test]
    fn choice_enforces_options_and_multiplicity() {
        let single = FieldKind::Choice { options: vec!["low".into(), "high".into()], multiple: false };
        assert!(single.validate(5, "low").is_ok());
        assert!(single.validate(5, "low, high").unwrap_err().reason.contains("only one"));
        assert!(single.validate(5, "medium").unwrap_err().reason.contains("`medium`"));

        let multi = FieldKind::Choice { options: vec!["low".into(), "high".into()], multiple: true };
        assert!(multi.validate(5, "low, high").is_ok());
    }

    #[test]
    fn kind_serializes_with_type_tag() {
        let kind = FieldKind::Number { min: Some(1.0), max: None, decimal_places: Some(1) };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["decimal_places"], 1);
        assert!(json.get("max").is_none());

        let parsed: FieldKind = serde_json::from_str(r#"{"type":"text"}"#).unwrap();
        assert_eq!(parsed, FieldKind::Text { max_len: None });
    }
}
