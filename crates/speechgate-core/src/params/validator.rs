use super::schema::{EffectiveParameters, ParamValue, ParameterKind, ParameterSchema};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Why a submitted parameter was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationReason {
    Unknown {
        accepted: Vec<String>,
    },
    WrongType {
        expected: ParameterKind,
        value: Value,
    },
    OutOfRange {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    NotAllowed {
        value: ParamValue,
        allowed: Vec<ParamValue>,
    },
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::Unknown { accepted } if accepted.is_empty() => {
                write!(f, "model accepts no parameters")
            }
            ViolationReason::Unknown { accepted } => {
                write!(f, "accepted parameters are: {}", accepted.join(", "))
            }
            ViolationReason::WrongType { expected, value } => {
                write!(f, "expected a {expected} value, got {value}")
            }
            ViolationReason::OutOfRange { value, min, max } => match (min, max) {
                (Some(min), Some(max)) => write!(f, "must be between {min} and {max} (got {value})"),
                (Some(min), None) => write!(f, "must be >= {min} (got {value})"),
                (None, Some(max)) => write!(f, "must be <= {max} (got {value})"),
                (None, None) => write!(f, "is out of range (got {value})"),
            },
            ViolationReason::NotAllowed { value, allowed } => {
                let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                write!(f, "must be one of: {} (got {value})", allowed.join(", "))
            }
        }
    }
}

/// A request parameter that failed validation, naming the parameter.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ParameterViolation {
    pub parameter: String,
    pub reason: ViolationReason,
}

impl fmt::Display for ParameterViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            ViolationReason::Unknown { .. } => {
                write!(f, "Unknown parameter '{}': {}", self.parameter, self.reason)
            }
            _ => write!(f, "Parameter '{}' {}", self.parameter, self.reason),
        }
    }
}

impl ParameterViolation {
    pub fn details(&self) -> Value {
        let mut details = json!({ "parameter": self.parameter });
        match &self.reason {
            ViolationReason::Unknown { accepted } => {
                details["accepted_parameters"] = json!(accepted);
            }
            ViolationReason::WrongType { expected, value } => {
                details["expected_type"] = json!(expected);
                details["value"] = value.clone();
            }
            ViolationReason::OutOfRange { value, min, max } => {
                details["value"] = json!(value);
                details["min_value"] = json!(min);
                details["max_value"] = json!(max);
            }
            ViolationReason::NotAllowed { value, allowed } => {
                details["value"] = value.to_json();
                details["allowed_values"] =
                    Value::Array(allowed.iter().map(ParamValue::to_json).collect());
            }
        }
        details
    }
}

/// Check submitted parameters against a schema and fill the gaps with defaults.
///
/// Unknown names are reported before type or range problems; names are visited in
/// sorted order so the reported parameter is deterministic.
pub fn validate_parameters(
    schema: &ParameterSchema,
    submitted: &BTreeMap<String, Value>,
) -> Result<EffectiveParameters, ParameterViolation> {
    if let Some(unknown) = submitted.keys().find(|name| schema.get(name).is_none()) {
        return Err(ParameterViolation {
            parameter: unknown.clone(),
            reason: ViolationReason::Unknown {
                accepted: schema.names(),
            },
        });
    }

    let mut effective = schema.defaults();
    for (name, raw) in submitted {
        let Some(definition) = schema.get(name) else {
            continue;
        };
        let value = definition.coerce(raw).map_err(|reason| ParameterViolation {
            parameter: name.clone(),
            reason,
        })?;
        effective.0.insert(name.clone(), value);
    }
    Ok(effective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterDefinition;

    fn schema() -> ParameterSchema {
        ParameterSchema::new(vec![
            ParameterDefinition::float("speed", "Speech rate multiplier", 1.0, 0.5, 2.0),
            ParameterDefinition::int("sample_rate", "Sample rate", 48000, None, None)
                .with_allowed_values(vec![
                    ParamValue::Int(8000),
                    ParamValue::Int(24000),
                    ParamValue::Int(48000),
                ]),
            ParameterDefinition::string_enum("speaker", "Voice", "xenia", &["aidar", "xenia"]),
        ])
    }

    fn submit(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_omitted_parameters_use_defaults() {
        let effective = validate_parameters(&schema(), &BTreeMap::new()).unwrap();
        assert_eq!(effective.len(), 3);
        assert_eq!(effective.get_f64("speed"), Some(1.0));
        assert_eq!(effective.get_str("speaker"), Some("xenia"));
        assert_eq!(effective.get("sample_rate"), Some(&ParamValue::Int(48000)));
    }

    #[test]
    fn test_partial_submission_is_completed() {
        let effective =
            validate_parameters(&schema(), &submit(&[("speed", json!("1.5"))])).unwrap();
        assert_eq!(effective.get_f64("speed"), Some(1.5));
        assert_eq!(effective.get_str("speaker"), Some("xenia"));
    }

    #[test]
    fn test_below_minimum_reports_range() {
        let err = validate_parameters(&schema(), &submit(&[("speed", json!(0.4))])).unwrap_err();
        assert_eq!(err.parameter, "speed");
        assert_eq!(
            err.reason,
            ViolationReason::OutOfRange {
                value: 0.4,
                min: Some(0.5),
                max: Some(2.0)
            }
        );
        let details = err.details();
        assert_eq!(details["min_value"], 0.5);
        assert_eq!(details["max_value"], 2.0);
        assert!(err.to_string().contains("between 0.5 and 2"));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let ok = validate_parameters(
            &schema(),
            &submit(&[("speed", json!(0.5)), ("sample_rate", json!(8000))]),
        );
        assert!(ok.is_ok());
        assert!(validate_parameters(&schema(), &submit(&[("speed", json!(2.0))])).is_ok());
    }

    #[test]
    fn test_unknown_parameter_is_named() {
        let err = validate_parameters(
            &schema(),
            &submit(&[("speed", json!(0.1)), ("pitch", json!(1.0))]),
        )
        .unwrap_err();
        assert_eq!(err.parameter, "pitch");
        assert!(matches!(err.reason, ViolationReason::Unknown { .. }));
        assert!(err.to_string().contains("'pitch'"));
    }

    #[test]
    fn test_enum_requires_exact_match() {
        let err = validate_parameters(&schema(), &submit(&[("speaker", json!("Xenia"))]))
            .unwrap_err();
        assert_eq!(err.parameter, "speaker");
        assert_eq!(err.details()["allowed_values"], json!(["aidar", "xenia"]));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err = validate_parameters(&schema(), &submit(&[("speed", json!([1]))])).unwrap_err();
        assert!(matches!(
            err.reason,
            ViolationReason::WrongType {
                expected: ParameterKind::Float,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_schema_rejects_everything() {
        let err = validate_parameters(
            &ParameterSchema::default(),
            &submit(&[("speed", json!(1.0))]),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown parameter 'speed': model accepts no parameters");
    }
}
