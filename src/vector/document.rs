use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata filter: `{key: value}` equality plus `$eq`, `$ne`, `$in`, `$nin`, `$and`, `$or`.
pub type SearchFilter = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub folder_id: String,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_type: i64,
    #[serde(default)]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_docs: Vec<Document>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// Metadata as a flat JSON object, the shape filters are evaluated against.
    pub fn metadata_value(&self) -> Value {
        let mut value = serde_json::to_value(&self.metadata).unwrap_or(Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("sub_docs");
        }
        value
    }
}

pub fn matches_filter(metadata: &Value, filter: &SearchFilter) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => sub_filters(condition).iter().all(|f| matches_filter(metadata, f)),
        "$or" => sub_filters(condition).iter().any(|f| matches_filter(metadata, f)),
        field => matches_condition(metadata.get(field), condition),
    })
}

fn sub_filters(condition: &Value) -> Vec<SearchFilter> {
    condition
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn matches_condition(actual: Option<&Value>, condition: &Value) -> bool {
    let operators = match condition.as_object() {
        Some(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops,
        _ => return actual.is_some_and(|v| values_equal(v, condition)),
    };

    operators.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => actual.is_some_and(|v| values_equal(v, operand)),
        "$ne" => !actual.is_some_and(|v| values_equal(v, operand)),
        "$in" => actual.is_some_and(|v| {
            operand
                .as_array()
                .is_some_and(|set| set.iter().any(|candidate| values_equal(v, candidate)))
        }),
        "$nin" => !actual.is_some_and(|v| {
            operand
                .as_array()
                .is_some_and(|set| set.iter().any(|candidate| values_equal(v, candidate)))
        }),
        _ => false,
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}
