//! Model parameter schemas and request-parameter validation.

mod schema;
mod validator;

pub use schema::{EffectiveParameters, ParamValue, ParameterDefinition, ParameterKind, ParameterSchema};
pub use validator::{ParameterViolation, ViolationReason, validate_parameters};
