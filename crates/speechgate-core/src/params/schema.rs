use super::validator::ViolationReason;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Value type of a model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParameterKind {
    Float,
    Int,
    String,
    Bool,
}

/// A concrete, already-checked parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Bool(v) => Value::from(*v),
            ParamValue::Int(v) => Value::from(*v),
            ParamValue::Float(v) => Value::from(*v),
            ParamValue::Str(v) => Value::from(v.as_str()),
        }
    }

    // Numeric values compare by magnitude so `8000` and `8000.0` are the same entry.
    fn matches(&self, other: &ParamValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "'{v}'"),
        }
    }
}

/// Definition of one model parameter, as declared by an engine or in configuration.
///
/// ```yaml
/// - name: speed
///   type: float
///   description: Speech rate multiplier
///   default: 1.0
///   min_value: 0.5
///   max_value: 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub description: String,
    pub default: ParamValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<ParamValue>>,
}

impl ParameterDefinition {
    pub fn float(
        name: impl Into<String>,
        description: impl Into<String>,
        default: f64,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Float,
            description: description.into(),
            default: ParamValue::Float(default),
            min_value: Some(min),
            max_value: Some(max),
            allowed_values: None,
        }
    }

    pub fn int(
        name: impl Into<String>,
        description: impl Into<String>,
        default: i64,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Int,
            description: description.into(),
            default: ParamValue::Int(default),
            min_value: min.map(|v| v as f64),
            max_value: max.map(|v| v as f64),
            allowed_values: None,
        }
    }

    pub fn string_enum(
        name: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
        allowed: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::String,
            description: description.into(),
            default: ParamValue::Str(default.into()),
            min_value: None,
            max_value: None,
            allowed_values: Some(
                allowed
                    .iter()
                    .map(|v| ParamValue::Str((*v).to_string()))
                    .collect(),
            ),
        }
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Bool,
            description: description.into(),
            default: ParamValue::Bool(default),
            min_value: None,
            max_value: None,
            allowed_values: None,
        }
    }

    pub fn with_allowed_values(mut self, allowed: Vec<ParamValue>) -> Self {
        self.allowed_values = Some(allowed);
        self
    }

    /// Coerce a submitted JSON value to this parameter's kind and check its constraints.
    pub fn coerce(&self, raw: &Value) -> Result<ParamValue, ViolationReason> {
        let value = match self.kind {
            ParameterKind::Float => coerce_float(raw).map(ParamValue::Float),
            ParameterKind::Int => coerce_int(raw).map(ParamValue::Int),
            ParameterKind::String => raw.as_str().map(|s| ParamValue::Str(s.to_string())),
            ParameterKind::Bool => coerce_bool(raw).map(ParamValue::Bool),
        }
        .ok_or_else(|| ViolationReason::WrongType {
            expected: self.kind,
            value: raw.clone(),
        })?;
        self.check(value)
    }

    fn check(&self, value: ParamValue) -> Result<ParamValue, ViolationReason> {
        if let Some(number) = value.as_f64() {
            let below = self.min_value.is_some_and(|min| number < min);
            let above = self.max_value.is_some_and(|max| number > max);
            if below || above {
                return Err(ViolationReason::OutOfRange {
                    value: number,
                    min: self.min_value,
                    max: self.max_value,
                });
            }
        }
        if let Some(allowed) = &self.allowed_values {
            if !allowed.iter().any(|candidate| candidate.matches(&value)) {
                return Err(ViolationReason::NotAllowed {
                    value,
                    allowed: allowed.clone(),
                });
            }
        }
        Ok(value)
    }

    /// Structural sanity of the definition itself, including its default.
    fn check_definition(&self) -> Result<(), String> {
        let numeric = matches!(self.kind, ParameterKind::Float | ParameterKind::Int);
        if !numeric && (self.min_value.is_some() || self.max_value.is_some()) {
            return Err(format!("min/max are only valid for numeric parameters, not {}", self.kind));
        }
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min > max {
                return Err(format!("min_value {min} is greater than max_value {max}"));
            }
        }
        if self.allowed_values.is_some()
            && matches!(self.kind, ParameterKind::Float | ParameterKind::Bool)
        {
            return Err(format!("allowed_values are not supported for {} parameters", self.kind));
        }
        self.coerce(&self.default.to_json())
            .map(|_| ())
            .map_err(|reason| format!("default {} is invalid: {reason}", self.default))
    }
}

fn coerce_float(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn coerce_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| is_integral_i64(*v)).map(|v| v as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

// `i64::MAX as f64` rounds up to 2^63, which is already out of range.
fn is_integral_i64(v: f64) -> bool {
    v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64
}

fn coerce_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Ordered set of parameter definitions for one model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema {
    parameters: Vec<ParameterDefinition>,
}

impl ParameterSchema {
    pub fn new(parameters: Vec<ParameterDefinition>) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn defaults(&self) -> EffectiveParameters {
        EffectiveParameters(
            self.parameters
                .iter()
                .map(|p| (p.name.clone(), p.default.clone()))
                .collect(),
        )
    }

    /// Replace the default of `name` with a configured override.
    ///
    /// Returns `(parameter, reason)` when the parameter is unknown or the override
    /// does not satisfy the parameter's constraints.
    pub(crate) fn override_default(
        &mut self,
        name: &str,
        raw: &Value,
    ) -> Result<(), (String, String)> {
        let definition = self
            .parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| (name.to_string(), "not defined by the model's schema".to_string()))?;
        let value = definition
            .coerce(raw)
            .map_err(|reason| (name.to_string(), format!("default override is invalid: {reason}")))?;
        definition.default = value;
        Ok(())
    }

    /// Check names are unique and every definition (and its default) is consistent.
    pub(crate) fn check(&self) -> Result<(), (String, String)> {
        for (index, definition) in self.parameters.iter().enumerate() {
            if self.parameters[..index]
                .iter()
                .any(|p| p.name == definition.name)
            {
                return Err((definition.name.clone(), "defined more than once".to_string()));
            }
            definition
                .check_definition()
                .map_err(|reason| (definition.name.clone(), reason))?;
        }
        Ok(())
    }
}

/// Complete parameter set forwarded to an engine: one entry per schema parameter.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct EffectiveParameters(pub(crate) BTreeMap<String, ParamValue>);

impl EffectiveParameters {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
