//! Answer Types
//!
//! [`PartialAnswer`] is the best current projection of a streamed document:
//! every field optional, rebuilt from scratch on every chunk. [`Answer`] is
//! the validated form, available only once the complete document conforms
//! to [`Schema::answer`](crate::schema::Schema::answer).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{Schema, SchemaViolation};

/// A strategy as seen mid-stream
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialStrategy {
    /// Strategy name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A step as seen mid-stream
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialStep {
    /// Step number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// What to do
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Best-effort projection of a possibly incomplete answer document
///
/// Fields that are absent, null, or of the wrong type are `None`. A snapshot
/// never merges with a previous one; consumers replace it wholesale and must
/// not assume that fields only ever grow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialAnswer {
    /// Headline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Named strategies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategies: Option<Vec<PartialStrategy>>,
    /// Ordered action steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<PartialStep>>,
    /// Free-form body text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Short tips
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<Vec<String>>,
}

fn string_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn array_field<T>(
    object: &serde_json::Map<String, Value>,
    key: &str,
    project: impl Fn(&Value) -> Option<T>,
) -> Option<Vec<T>> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(&project).collect())
}

impl PartialAnswer {
    /// Project a parsed (possibly repaired) document
    ///
    /// Returns `None` if the document is not an object.
    #[must_use]
    pub fn project(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        Some(Self {
            title: string_field(object, "title"),
            description: string_field(object, "description"),
            strategies: array_field(object, "strategies", |item| {
                let item = item.as_object()?;
                Some(PartialStrategy {
                    name: string_field(item, "name"),
                    detail: string_field(item, "detail"),
                })
            }),
            steps: array_field(object, "steps", |item| {
                let item = item.as_object()?;
                Some(PartialStep {
                    step: item.get("step").and_then(Value::as_f64),
                    action: string_field(item, "action"),
                })
            }),
            content: string_field(object, "content"),
            tips: array_field(object, "tips", |item| item.as_str().map(str::to_string)),
        })
    }

    /// Whether no field has been recognised yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Number of top-level fields present
    #[must_use]
    pub fn field_count(&self) -> usize {
        [
            self.title.is_some(),
            self.description.is_some(),
            self.strategies.is_some(),
            self.steps.is_some(),
            self.content.is_some(),
            self.tips.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// A validated strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Strategy name
    pub name: String,
    /// Explanation
    #[serde(default)]
    pub detail: Option<String>,
}

/// A validated step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step number
    #[serde(default)]
    pub step: Option<f64>,
    /// What to do
    pub action: String,
}

/// An answer that conforms to the full schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Headline
    pub title: String,
    /// Short summary
    #[serde(default)]
    pub description: Option<String>,
    /// Named strategies
    #[serde(default)]
    pub strategies: Option<Vec<Strategy>>,
    /// Ordered action steps
    #[serde(default)]
    pub steps: Option<Vec<Step>>,
    /// Free-form body text
    #[serde(default)]
    pub content: Option<String>,
    /// Short tips
    #[serde(default)]
    pub tips: Option<Vec<String>>,
}

impl Answer {
    /// Validate a complete document against `schema` and convert it
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolation`] listing every violation.
    pub fn validate(schema: &Schema, value: &Value) -> Result<Self, SchemaViolation> {
        schema.check(value)?;
        serde_json::from_value(value.clone()).map_err(|e| SchemaViolation {
            violations: vec![crate::schema::Violation {
                path: "/".to_string(),
                kind: crate::schema::ViolationKind::WrongType {
                    expected: "answer",
                    found: if e.is_data() { "mismatched data" } else { "invalid document" },
                },
            }],
        })
    }
}

impl From<Answer> for PartialAnswer {
    fn from(answer: Answer) -> Self {
        Self {
            title: Some(answer.title),
            description: answer.description,
            strategies: answer.strategies.map(|items| {
                items
                    .into_iter()
                    .map(|s| PartialStrategy {
                        name: Some(s.name),
                        detail: s.detail,
                    })
                    .collect()
            }),
            steps: answer.steps.map(|items| {
                items
                    .into_iter()
                    .map(|s| PartialStep {
                        step: s.step,
                        action: Some(s.action),
                    })
                    .collect()
            }),
            content: answer.content,
            tips: answer.tips,
        }
    }
}
