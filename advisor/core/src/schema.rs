//! Answer Schema
//!
//! The shape of a structured financial answer, declared once and used twice:
//! rendered as JSON Schema for the provider's structured-output mode, and
//! used to validate the final streamed document.
//!
//! ```text
//! title        string   required
//! description  string   optional
//! strategies   [{ name: string (required), detail: string }]   optional
//! steps        [{ step: number, action: string (required) }]   optional
//! content      string   optional
//! tips         [string] optional
//! ```
//!
//! Optional fields accept `null` as well as absence. Strict structured-output
//! providers require every property to be listed as required, so optional
//! properties are rendered as nullable instead.

use std::fmt;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Type of a schema field
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// Homogeneous array
    Array(Box<FieldType>),
    /// Object with declared fields
    Object(Vec<FieldSpec>),
}

impl FieldType {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

/// One named field of an object
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    /// Property name
    pub name: String,
    /// Value type
    pub ty: FieldType,
    /// Whether the field must be present and non-null
    pub required: bool,
}

impl FieldSpec {
    /// A required field
    pub fn required(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    /// An optional (nullable) field
    pub fn optional(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// A named top-level object schema
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    /// Name reported to the provider
    pub name: String,
    /// Top-level fields
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// The financial-advice answer schema
    #[must_use]
    pub fn answer() -> Self {
        Self {
            name: "financial_advice".to_string(),
            fields: vec![
                FieldSpec::required("title", FieldType::String),
                FieldSpec::optional("description", FieldType::String),
                FieldSpec::optional(
                    "strategies",
                    FieldType::Array(Box::new(FieldType::Object(vec![
                        FieldSpec::required("name", FieldType::String),
                        FieldSpec::optional("detail", FieldType::String),
                    ]))),
                ),
                FieldSpec::optional(
                    "steps",
                    FieldType::Array(Box::new(FieldType::Object(vec![
                        FieldSpec::optional("step", FieldType::Number),
                        FieldSpec::required("action", FieldType::String),
                    ]))),
                ),
                FieldSpec::optional("content", FieldType::String),
                FieldSpec::optional("tips", FieldType::Array(Box::new(FieldType::String))),
            ],
        }
    }

    /// Render as JSON Schema (strict structured-output flavour)
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        object_schema(&self.fields)
    }

    /// Validate a complete document, returning every violation found
    #[must_use]
    pub fn validate(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        validate_object(&self.fields, value, "", &mut violations);
        violations
    }

    /// Validate, wrapping violations in an error
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolation`] if the document does not conform.
    pub fn check(&self, value: &Value) -> Result<(), SchemaViolation> {
        let violations = self.validate(value);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation { violations })
        }
    }
}

fn type_schema(ty: &FieldType, nullable: bool) -> Value {
    let mut schema = match ty {
        FieldType::String | FieldType::Number => json!({}),
        FieldType::Array(items) => json!({ "items": type_schema(items, false) }),
        FieldType::Object(fields) => object_schema(fields),
    };
    schema["type"] = if nullable {
        json!([ty.json_type(), "null"])
    } else {
        json!(ty.json_type())
    };
    schema
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.clone(), type_schema(&f.ty, !f.required)))
        .collect();
    let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_object(fields: &[FieldSpec], value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(object) = value.as_object() else {
        out.push(Violation::wrong_type(path, "object", value));
        return;
    };

    for field in fields {
        let field_path = format!("{path}/{}", field.name);
        match object.get(&field.name) {
            None | Some(Value::Null) if field.required => out.push(Violation {
                path: field_path,
                kind: ViolationKind::Missing,
            }),
            None | Some(Value::Null) => {}
            Some(v) => validate_type(&field.ty, v, &field_path, out),
        }
    }
}

fn validate_type(ty: &FieldType, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match (ty, value) {
        (FieldType::String, Value::String(_)) | (FieldType::Number, Value::Number(_)) => {}
        (FieldType::Array(items), Value::Array(elements)) => {
            for (i, element) in elements.iter().enumerate() {
                validate_type(items, element, &format!("{path}/{i}"), out);
            }
        }
        (FieldType::Object(fields), Value::Object(_)) => validate_object(fields, value, path, out),
        _ => out.push(Violation::wrong_type(path, ty.json_type(), value)),
    }
}

/// What went wrong at one location
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// A required field is absent or null
    Missing,
    /// A field has the wrong JSON type
    WrongType {
        /// Declared type
        expected: &'static str,
        /// Type actually found
        found: &'static str,
    },
}

/// A single schema violation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Slash-separated location, e.g. `/steps/0/action`
    pub path: String,
    /// The violation
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl Violation {
    fn wrong_type(path: &str, expected: &'static str, found: &Value) -> Self {
        Self {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            kind: ViolationKind::WrongType {
                expected,
                found: json_type_name(found),
            },
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::Missing => write!(f, "{}: missing required field", self.path),
            ViolationKind::WrongType { expected, found } => {
                write!(f, "{}: expected {expected}, found {found}", self.path)
            }
        }
    }
}

/// The final document does not conform to the schema
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[error("answer failed schema validation: {}", summarize(.violations))]
pub struct SchemaViolation {
    /// Every violation found
    pub violations: Vec<Violation>,
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
