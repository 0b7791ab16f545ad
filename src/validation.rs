//! Payload validation against a contract
//!
//! Validation never fails as an operation: mismatches are returned as
//! [`Violation`]s so the caller decides how to answer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{Contract, FieldRule};

/// A single mismatch between a payload and a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending field; empty when the payload as a whole is wrong
    pub field: String,
    #[serde(flatten)]
    pub reason: ViolationReason,
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: ViolationReason) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.field, self.reason)
        }
    }
}

/// Why a field was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ViolationReason {
    NotAnObject { found: String },
    Missing,
    TypeMismatch { expected: String, found: String },
    NotAllowed { allowed: Vec<Value> },
    BelowMinimum { minimum: f64 },
    AboveMaximum { maximum: f64 },
    TooShort { min_length: usize },
    PatternMismatch { pattern: String },
    Undeclared,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::NotAnObject { found } => {
                write!(f, "payload must be an object, got {}", found)
            }
            ViolationReason::Missing => f.write_str("required field is missing"),
            ViolationReason::TypeMismatch { expected, found } => {
                write!(f, "expected {}, got {}", expected, found)
            }
            ViolationReason::NotAllowed { allowed } => {
                let values: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                write!(f, "value must be one of [{}]", values.join(", "))
            }
            ViolationReason::BelowMinimum { minimum } => {
                write!(f, "value must be at least {}", minimum)
            }
            ViolationReason::AboveMaximum { maximum } => {
                write!(f, "value must be at most {}", maximum)
            }
            ViolationReason::TooShort { min_length } => {
                write!(f, "value must have at least {} characters", min_length)
            }
            ViolationReason::PatternMismatch { pattern } => {
                write!(f, "value does not match pattern '{}'", pattern)
            }
            ViolationReason::Undeclared => f.write_str("field is not declared by the contract"),
        }
    }
}

/// Name of a JSON value's type, as used in violation messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl FieldRule {
    /// Check a present value against this rule, returning the first failure
    pub fn check(&self, value: &Value) -> Option<ViolationReason> {
        if !self.field_type.base.matches(value) {
            return Some(ViolationReason::TypeMismatch {
                expected: self.field_type.to_string(),
                found: json_type_name(value).to_string(),
            });
        }

        let constraints = &self.constraints;
        if let Some(allowed) = &constraints.allowed {
            if !allowed.contains(value) {
                return Some(ViolationReason::NotAllowed {
                    allowed: allowed.clone(),
                });
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(minimum) = constraints.minimum {
                if number < minimum {
                    return Some(ViolationReason::BelowMinimum { minimum });
                }
            }
            if let Some(maximum) = constraints.maximum {
                if number > maximum {
                    return Some(ViolationReason::AboveMaximum { maximum });
                }
            }
        }

        if let Some(text) = value.as_str() {
            if let Some(min_length) = constraints.min_length {
                if text.chars().count() < min_length {
                    return Some(ViolationReason::TooShort { min_length });
                }
            }
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(text) {
                    return Some(ViolationReason::PatternMismatch {
                        pattern: pattern.as_str().to_string(),
                    });
                }
            }
        }

        None
    }
}

impl Contract {
    /// Validate a payload, returning every violation found.
    ///
    /// Declared fields are reported in declaration order, followed by
    /// undeclared fields when the contract is strict.
    pub fn check(&self, payload: &Value) -> Vec<Violation> {
        let Some(object) = payload.as_object() else {
            return vec![Violation::new(
                "",
                ViolationReason::NotAnObject {
                    found: json_type_name(payload).to_string(),
                },
            )];
        };

        let mut violations = self.check_fields(object);
        if self.strict {
            violations.extend(
                object
                    .keys()
                    .filter(|key| self.field(key).is_none())
                    .map(|key| Violation::new(key.as_str(), ViolationReason::Undeclared)),
            );
        }
        violations
    }

    fn check_fields(&self, object: &Map<String, Value>) -> Vec<Violation> {
        let mut violations = Vec::new();
        for rule in &self.fields {
            match object.get(&rule.name) {
                Some(value) => {
                    if let Some(reason) = rule.check(value) {
                        violations.push(Violation::new(rule.name.as_str(), reason));
                    }
                }
                None if rule.required => {
                    violations.push(Violation::new(rule.name.as_str(), ViolationReason::Missing));
                }
                None => {}
            }
        }
        violations
    }
}
