//! Contract types and structures
//!
//! A contract document is authored as JSON or TOML and deserialized into
//! [`ContractDocument`]. Compiling a document resolves named types, checks
//! every constraint for consistency and yields immutable [`Contract`]s.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of an operation a contract describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Payload sent by the caller
    Request,
    /// Payload returned to the caller
    Response,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "request" | "req" => Ok(Direction::Request),
            "response" | "resp" => Ok(Direction::Response),
            other => Err(format!("unknown direction '{}', expected request or response", other)),
        }
    }
}

/// Built-in value types a field may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Accepts any JSON value
    Any,
}

impl Primitive {
    /// Resolve a primitive from its document name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Primitive::String),
            "number" => Some(Primitive::Number),
            "integer" => Some(Primitive::Integer),
            "boolean" => Some(Primitive::Boolean),
            "object" => Some(Primitive::Object),
            "array" => Some(Primitive::Array),
            "any" => Some(Primitive::Any),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Number => "number",
            Primitive::Integer => "integer",
            Primitive::Boolean => "boolean",
            Primitive::Object => "object",
            Primitive::Array => "array",
            Primitive::Any => "any",
        }
    }

    /// Whether a JSON value inhabits this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Primitive::String => value.is_string(),
            Primitive::Number => value.is_number(),
            Primitive::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map_or(false, |f| f.is_finite() && f.fract() == 0.0)
            }
            Primitive::Boolean => value.is_boolean(),
            Primitive::Object => value.is_object(),
            Primitive::Array => value.is_array(),
            Primitive::Any => true,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Primitive::Number | Primitive::Integer)
    }
}

/// Optional value constraints shared by named types and fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Allowed values
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Constraints {
    /// Layer `over` on top of `self`; set values in `over` win
    pub fn overlay(&self, over: &Constraints) -> Constraints {
        Constraints {
            allowed: over.allowed.clone().or_else(|| self.allowed.clone()),
            minimum: over.minimum.or(self.minimum),
            maximum: over.maximum.or(self.maximum),
            min_length: over.min_length.or(self.min_length),
            pattern: over.pattern.clone().or_else(|| self.pattern.clone()),
        }
    }

    /// Check the constraints make sense for `base`, compiling the pattern.
    /// Problems are appended to `issues` prefixed with `context`.
    fn check(&self, context: &str, base: Primitive, issues: &mut Vec<String>) -> Option<Regex> {
        let base_name = base.name();
        if (self.minimum.is_some() || self.maximum.is_some()) && !base.is_numeric() {
            issues.push(format!(
                "{}: minimum/maximum require a numeric type, not {}",
                context, base_name
            ));
        }
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                issues.push(format!("{}: minimum {} exceeds maximum {}", context, min, max));
            }
        }
        if self.min_length.is_some() && base != Primitive::String {
            issues.push(format!(
                "{}: min_length requires a string type, not {}",
                context, base_name
            ));
        }
        if let Some(allowed) = &self.allowed {
            if allowed.is_empty() {
                issues.push(format!("{}: enum must list at least one value", context));
            }
            for value in allowed.iter().filter(|v| !base.matches(v)) {
                issues.push(format!("{}: enum value {} is not a {}", context, value, base.name()));
            }
        }

        let pattern = self.pattern.as_ref()?;
        if base != Primitive::String {
            issues.push(format!(
                "{}: pattern requires a string type, not {}",
                context, base_name
            ));
            return None;
        }
        match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                issues.push(format!("{}: invalid pattern '{}': {}", context, pattern, e));
                None
            }
        }
    }
}

/// A named type declared in the `types` table of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// Primitive the type refines
    pub base: String,
    #[serde(flatten)]
    pub constraints: Constraints,
}

/// A field as written in a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Primitive name or a key of the `types` table
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub constraints: Constraints,
}

/// An operation contract as written in a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDef {
    pub operation: String,
    pub direction: Direction,
    /// Overrides the document-wide `strict` flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// A complete contract document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDocument {
    /// Semantic version of the contract set
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Default strictness for contracts that don't set their own
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDef>,
    #[serde(default)]
    pub operations: Vec<ContractDef>,
}

impl ContractDocument {
    /// Resolve types and constraints into contracts.
    ///
    /// Every problem in the document is collected; the document compiles only
    /// if none were found.
    pub fn compile(&self) -> Result<Vec<Contract>, Vec<String>> {
        let mut issues = Vec::new();

        let mut types = BTreeMap::new();
        for (name, def) in &self.types {
            if Primitive::parse(name).is_some() {
                issues.push(format!("type '{}' shadows a primitive", name));
                continue;
            }
            match Primitive::parse(&def.base) {
                Some(base) => {
                    def.constraints.check(&format!("type '{}'", name), base, &mut issues);
                    types.insert(name.as_str(), (base, &def.constraints));
                }
                None => issues.push(format!(
                    "type '{}': base '{}' is not a primitive type",
                    name, def.base
                )),
            }
        }

        let mut contracts = Vec::with_capacity(self.operations.len());
        for def in &self.operations {
            let label = format!("{} ({})", def.operation, def.direction);
            let mut seen = HashSet::new();
            let mut fields = Vec::with_capacity(def.fields.len());

            for field in &def.fields {
                let context = format!("{} field '{}'", label, field.name);
                if !seen.insert(field.name.as_str()) {
                    issues.push(format!("{}: declared more than once", context));
                    continue;
                }

                let (base, inherited) = match Primitive::parse(&field.type_name) {
                    Some(base) => (base, Constraints::default()),
                    None => match types.get(field.type_name.as_str()) {
                        Some((base, constraints)) => (*base, (*constraints).clone()),
                        None => {
                            issues.push(format!(
                                "{}: references undefined type '{}'",
                                context, field.type_name
                            ));
                            continue;
                        }
                    },
                };

                let constraints = inherited.overlay(&field.constraints);
                let pattern = constraints.check(&context, base, &mut issues);
                fields.push(FieldRule {
                    name: field.name.clone(),
                    field_type: FieldType {
                        name: field.type_name.clone(),
                        base,
                    },
                    required: field.required,
                    constraints,
                    pattern,
                });
            }

            contracts.push(Contract {
                operation: def.operation.clone(),
                direction: def.direction,
                strict: def.strict.unwrap_or(self.strict),
                description: def.description.clone(),
                fields,
            });
        }

        if issues.is_empty() {
            Ok(contracts)
        } else {
            Err(issues)
        }
    }
}

/// A resolved field type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    /// Name as declared (a primitive or a named type)
    pub name: String,
    pub base: Primitive,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.base.name() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} ({})", self.name, self.base.name())
        }
    }
}

/// A resolved field of a contract
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub constraints: Constraints,
    pub(crate) pattern: Option<Regex>,
}

/// Validation rules for one operation in one direction
#[derive(Debug, Clone)]
pub struct Contract {
    pub operation: String,
    pub direction: Direction,
    /// Undeclared fields are violations when set
    pub strict: bool,
    pub description: Option<String>,
    pub fields: Vec<FieldRule>,
}

impl Contract {
    /// Get a field rule by name
    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the required fields, in declaration order
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name.as_str())
    }

    /// Get a unique key for this contract
    pub fn key(&self) -> String {
        format!("{}/{}", self.operation, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> ContractDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("request".parse::<Direction>().unwrap(), Direction::Request);
        assert_eq!("Response".parse::<Direction>().unwrap(), Direction::Response);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        assert!(Primitive::Integer.matches(&json!(3)));
        assert!(Primitive::Integer.matches(&json!(3.0)));
        assert!(!Primitive::Integer.matches(&json!(3.5)));
        assert!(!Primitive::Integer.matches(&json!("3")));
    }

    #[test]
    fn test_named_type_resolution() {
        let doc = document(json!({
            "version": "1.0.0",
            "types": { "Price": { "base": "number", "minimum": 0 } },
            "operations": [{
                "operation": "create",
                "direction": "request",
                "fields": [{ "name": "price", "type": "Price", "required": true }]
            }]
        }));

        let contracts = doc.compile().unwrap();
        let price = contracts[0].field("price").unwrap();
        assert_eq!(price.field_type.base, Primitive::Number);
        assert_eq!(price.constraints.minimum, Some(0.0));
        assert_eq!(price.field_type.to_string(), "Price (number)");
    }

    #[test]
    fn test_field_constraints_override_type() {
        let doc = document(json!({
            "version": "1.0.0",
            "types": { "Price": { "base": "number", "minimum": 0, "maximum": 100 } },
            "operations": [{
                "operation": "create",
                "direction": "request",
                "fields": [{ "name": "price", "type": "Price", "maximum": 500 }]
            }]
        }));

        let contracts = doc.compile().unwrap();
        let price = contracts[0].field("price").unwrap();
        assert_eq!(price.constraints.minimum, Some(0.0));
        assert_eq!(price.constraints.maximum, Some(500.0));
    }

    #[test]
    fn test_undefined_type_is_reported() {
        let doc = document(json!({
            "version": "1.0.0",
            "operations": [{
                "operation": "create",
                "direction": "request",
                "fields": [{ "name": "price", "type": "Money" }]
            }]
        }));

        let issues = doc.compile().unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("undefined type 'Money'"));
    }

    #[test]
    fn test_all_issues_collected() {
        let doc = document(json!({
            "version": "1.0.0",
            "types": { "Code": { "base": "text" } },
            "operations": [{
                "operation": "create",
                "direction": "request",
                "fields": [
                    { "name": "title", "type": "string", "minimum": 1 },
                    { "name": "title", "type": "string" },
                    { "name": "slug", "type": "string", "pattern": "(" },
                    { "name": "rank", "type": "integer", "minimum": 5, "maximum": 1 },
                    { "name": "kind", "type": "string", "enum": ["a", 2] }
                ]
            }]
        }));

        let issues = doc.compile().unwrap_err();
        assert_eq!(issues.len(), 6, "{:#?}", issues);
    }

    #[test]
    fn test_contract_strictness_defaults_to_document() {
        let doc = document(json!({
            "version": "1.0.0",
            "strict": true,
            "operations": [
                { "operation": "a", "direction": "request", "fields": [] },
                { "operation": "b", "direction": "request", "strict": false, "fields": [] }
            ]
        }));

        let contracts = doc.compile().unwrap();
        assert!(contracts[0].strict);
        assert!(!contracts[1].strict);
    }
}
