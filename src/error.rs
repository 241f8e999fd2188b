// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Error Taxonomy

//! Errors raised by the analysis components.
//!
//! Only structural and fatal conditions are errors. Numeric trouble (NaN,
//! infinities, division by zero) is absorbed by [`crate::numeric`] and never
//! reaches this module. Identity failures and malformed records are reported
//! per record as [`RecordError`] and the record is dropped.

use serde::Serialize;

/// Component-level failure. The pipeline turns these into an unavailable
/// section instead of aborting the whole pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("malformed input: `{collection}` must be {expected}")]
    MalformedInput {
        collection: &'static str,
        expected: &'static str,
    },

    #[error("insufficient data for {component}: {reason}")]
    InsufficientData {
        component: &'static str,
        reason: String,
    },

    #[error("invalid configuration: {parameter} {reason}")]
    InvalidConfig {
        parameter: &'static str,
        reason: String,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl AnalysisError {
    pub fn insufficient(component: &'static str, reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            component,
            reason: reason.into(),
        }
    }

    pub fn invalid_config(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            parameter,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Why a single input record was rejected at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RecordError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("field `{field}` is not a finite number")]
    InvalidNumber { field: String },

    #[error("field `{field}` must not be negative")]
    NegativeValue { field: String },

    #[error("geometry is not valid GeoJSON: {reason}")]
    InvalidGeometry { reason: String },

    #[error("period `{value}` is not YYYY-MM or YYYY-MM-DD")]
    InvalidPeriod { value: String },

    #[error("region name `{name}` does not normalize to an identifier")]
    UnnormalizableRegion { name: String },

    #[error("region `{region}` is not a known region")]
    UnknownRegion { region: String },

    #[error("region `{region}` is excluded from analysis")]
    ExcludedRegion { region: String },

    #[error("flow from `{region}` to itself")]
    SelfLoop { region: String },
}

/// A rejected record with its position in the source collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRecord {
    pub collection: &'static str,
    pub index: usize,
    pub error: RecordError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let e = AnalysisError::MalformedInput {
            collection: "flows",
            expected: "an array",
        };
        assert_eq!(e.to_string(), "malformed input: `flows` must be an array");

        let r = RecordError::MissingField { field: "price".into() };
        assert!(r.to_string().contains("price"));
    }

    #[test]
    fn insufficient_helper_builds_variant() {
        let e = AnalysisError::insufficient("market health", "no time series");
        assert!(matches!(
            e,
            AnalysisError::InsufficientData { component: "market health", .. }
        ));
    }

    #[test]
    fn record_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(RecordError::SelfLoop { region: "aden".into() })
            .expect("test: serialize");
        assert_eq!(json["kind"], "selfLoop");
        assert_eq!(json["region"], "aden");
    }
}
