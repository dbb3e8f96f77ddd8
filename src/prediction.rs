//! Classifier output as it crosses into the core.
//!
//! The upstream collaborator is not trusted to hand over clean scalars: a
//! confidence may show up wrapped in one or more arrays (`[0.9]`,
//! `[[0.9, 0.1]]`), as a numeric string, or as `null`, a boolean or an object.
//! `NumericField` captures every shape so the decision about what to do with
//! it is made in one place, and one odd prediction never fails a whole batch.
//! The same type describes legacy ledger columns that the sanitizer repairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EcoError, Result};

/// A number that may have arrived as something other than a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Scalar(f64),
    Many(Vec<Value>),
    Text(String),
    /// `null`, a boolean or an object. Never yields a number.
    Other(Value),
}

impl NumericField {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// First scalar reachable by following first elements of nested arrays.
    /// Numeric strings parse; anything else yields `None`.
    pub fn leading_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Text(s) => parse_number(s),
            Self::Many(items) => items.first().and_then(leading_value),
            Self::Other(_) => None,
        }
    }

    /// Strict read: only a finite scalar is accepted.
    pub fn require_scalar(&self, field: &'static str) -> Result<f64> {
        match self {
            Self::Scalar(v) if v.is_finite() => Ok(*v),
            Self::Scalar(v) => Err(EcoError::invalid(field, format!("non-finite value {v}"))),
            Self::Many(items) => Err(EcoError::invalid(
                field,
                format!("expected a number, got a sequence of {} element(s)", items.len()),
            )),
            Self::Text(s) => Err(EcoError::invalid(
                field,
                format!("expected a number, got text {s:?}"),
            )),
            Self::Other(v) => Err(EcoError::invalid(
                field,
                format!("expected a number, got {v}"),
            )),
        }
    }

    /// The legacy repair rule: a scalar stays as is, a structure collapses to
    /// its leading scalar, and a structure without one becomes `default`.
    pub fn repaired_or(&self, default: f64) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            other => other
                .leading_scalar()
                .filter(|v| v.is_finite())
                .unwrap_or(default),
        }
    }
}

impl From<f64> for NumericField {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

fn leading_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        Value::Array(items) => items.first().and_then(leading_value),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// One `(label, confidence)` pair from the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: NumericField,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence: NumericField::Scalar(confidence),
        }
    }

    /// Confidence usable for mapping: unwrapped from any nesting, finite, and
    /// clamped to `[0, 1]`. `None` means the prediction cannot take part.
    pub fn resolved_confidence(&self) -> Option<f64> {
        self.confidence
            .leading_scalar()
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
    }
}
