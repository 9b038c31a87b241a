//! Parameter coercion and SQL-test template validation (spec §4.J).
//!
//! Given declared `{name, type, required, default?}` and a supplied
//! `name -> value` map, coerces each supplied value to its declared type
//! and validates that every `{{name}}` token in a SQL template string
//! corresponds to a declared parameter.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoercionError;

/// Declared parameter types (spec §4.J).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Decimal,
    Boolean,
    Uuid,
    Date,
    Timestamp,
    /// `<T>[]`: an array whose elements are recursively coerced as `T`.
    Array(Box<ParamType>),
}

/// A declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamDeclaration {
    pub fn new(name: impl Into<String>, param_type: ParamType, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type,
            required,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Coerces `supplied` against `declarations`, per spec §4.J:
/// - a missing required parameter errors unless it has a non-nil default;
/// - an unknown supplied key errors;
/// - a supplied `null` value is dropped from the result;
/// - every other value is coerced to its declared type.
pub fn coerce_params(
    declarations: &[ParamDeclaration],
    supplied: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>, CoercionError> {
    let declared_names: std::collections::HashSet<&str> =
        declarations.iter().map(|d| d.name.as_str()).collect();
    for key in supplied.keys() {
        if !declared_names.contains(key.as_str()) {
            return Err(CoercionError::UnknownParameter(key.clone()));
        }
    }

    let mut result = HashMap::with_capacity(declarations.len());
    for decl in declarations {
        match supplied.get(&decl.name) {
            Some(Value::Null) | None => {
                if let Some(default) = decl.default.clone() {
                    if !default.is_null() {
                        result.insert(decl.name.clone(), coerce_value(&decl.param_type, &default)?);
                    }
                } else if decl.required {
                    return Err(CoercionError::MissingRequired(decl.name.clone()));
                }
            }
            Some(value) => {
                result.insert(decl.name.clone(), coerce_value(&decl.param_type, value)?);
            }
        }
    }
    Ok(result)
}

fn coerce_value(ty: &ParamType, value: &Value) -> Result<Value, CoercionError> {
    match ty {
        ParamType::String => Ok(Value::String(stringify(value))),
        ParamType::Integer => coerce_integer(value).map(Value::from),
        ParamType::Decimal => coerce_decimal(value).map(|f| {
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }),
        ParamType::Boolean => coerce_boolean(value).map(Value::Bool),
        ParamType::Uuid => coerce_uuid(value).map(|u| Value::String(u.to_string())),
        ParamType::Date => coerce_date(value).map(Value::String),
        ParamType::Timestamp => coerce_timestamp(value).map(Value::String),
        ParamType::Array(inner) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(coerce_value(inner, item)?);
                }
                Ok(Value::Array(out))
            }
            other => coerce_value(inner, other).map(|v| Value::Array(vec![v])),
        },
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn coerce_integer(value: &Value) -> Result<i64, CoercionError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    Ok(f as i64)
                } else {
                    Err(CoercionError::InvalidInteger(n.to_string()))
                }
            } else {
                Err(CoercionError::InvalidInteger(n.to_string()))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CoercionError::InvalidInteger(s.clone())),
        other => Err(CoercionError::InvalidInteger(other.to_string())),
    }
}

fn coerce_decimal(value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CoercionError::InvalidDecimal(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| CoercionError::InvalidDecimal(s.clone())),
        other => Err(CoercionError::InvalidDecimal(other.to_string())),
    }
}

fn coerce_boolean(value: &Value) -> Result<bool, CoercionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(CoercionError::InvalidBoolean(n.to_string())),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(CoercionError::InvalidBoolean(other.to_string())),
        },
        other => Err(CoercionError::InvalidBoolean(other.to_string())),
    }
}

fn coerce_uuid(value: &Value) -> Result<Uuid, CoercionError> {
    let s = match value {
        Value::String(s) => s.as_str(),
        other => return Err(CoercionError::InvalidUuid(other.to_string())),
    };
    Uuid::parse_str(s).map_err(|_| CoercionError::InvalidUuid(s.to_string()))
}

fn coerce_date(value: &Value) -> Result<String, CoercionError> {
    let s = match value {
        Value::String(s) => s.as_str(),
        other => return Err(CoercionError::InvalidDate(other.to_string())),
    };
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| CoercionError::InvalidDate(s.to_string()))
}

fn coerce_timestamp(value: &Value) -> Result<String, CoercionError> {
    let s = match value {
        Value::String(s) => s.as_str(),
        other => return Err(CoercionError::InvalidTimestamp(other.to_string())),
    };
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .map_err(|_| CoercionError::InvalidTimestamp(s.to_string()))
}

/// Extracts the set of `{{name}}` tokens from a SQL template string
/// (SPEC_FULL §4 supplement 4). Read-only token discovery, not rendering
/// — a full template engine is unnecessary for validation alone.
pub fn extract_template_tokens(template: &str) -> Vec<String> {
    template_token_re()
        .captures_iter(template)
        .map(|c| c[1].trim().to_string())
        .collect()
}

fn template_token_re() -> Regex {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("static regex is valid")
}

/// Validates that every `{{name}}` token in `template` corresponds to a
/// declared parameter; extras are errors (spec §4.J).
pub fn validate_template(declarations: &[ParamDeclaration], template: &str) -> Result<(), CoercionError> {
    let declared_names: std::collections::HashSet<&str> =
        declarations.iter().map(|d| d.name.as_str()).collect();
    for token in extract_template_tokens(template) {
        if !declared_names.contains(token.as_str()) {
            return Err(CoercionError::UndeclaredTemplateToken(token));
        }
    }
    Ok(())
}
