use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Attribute used when a field expects an object reference such as `{"value": "Eng"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefAttr {
    #[default]
    Value,
    Name,
    Id,
    Key,
    OriginalEstimate,
}

impl RefAttr {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefAttr::Value => "value",
            RefAttr::Name => "name",
            RefAttr::Id => "id",
            RefAttr::Key => "key",
            RefAttr::OriginalEstimate => "originalEstimate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Value),
    OptionRef(RefAttr, String),
    OptionRefList(RefAttr, Vec<String>),
    StringList(Vec<String>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Scalar(Value::String(s.into()))
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::OptionRef(attr, s) => reference(*attr, s),
            FieldValue::OptionRefList(attr, items) => {
                Value::Array(items.iter().map(|s| reference(*attr, s)).collect())
            }
            FieldValue::StringList(items) => json!(items),
        }
    }
}

/// Shape a configured field expects, used to turn a raw string into a [`FieldValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldShape {
    #[default]
    Scalar,
    Option,
    OptionList,
    StringList,
}

impl FieldShape {
    pub fn value_from(&self, attr: RefAttr, raw: &str) -> FieldValue {
        let raw = strip_quotes(raw.trim());
        match self {
            FieldShape::Scalar => FieldValue::text(raw),
            FieldShape::Option => FieldValue::OptionRef(attr, raw.to_string()),
            FieldShape::OptionList => FieldValue::OptionRefList(attr, split_list(raw)),
            FieldShape::StringList => FieldValue::StringList(split_list(raw)),
        }
    }
}

/// Logical field name → Jira field id and expected shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub id: String,
    #[serde(default)]
    pub shape: FieldShape,
    #[serde(default)]
    pub attr: RefAttr,
}

impl FieldMapping {
    pub fn new(id: &str, shape: FieldShape, attr: RefAttr) -> Self {
        Self {
            id: id.to_string(),
            shape,
            attr,
        }
    }

    pub fn value_from(&self, raw: &str) -> FieldValue {
        self.shape.value_from(self.attr, raw)
    }
}

/// A field value applied to every created issue unless the row or an override replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefault {
    pub name: String,
    pub field_id: String,
    pub value: FieldValue,
}

/// Field writes keyed by field id. Later writes to the same id replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet(Map<String, Value>);

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field_id: &str, value: &FieldValue) {
        self.0.insert(field_id.to_string(), value.to_json());
    }

    pub fn get(&self, field_id: &str) -> Option<&Value> {
        self.0.get(field_id)
    }

    pub fn single(field_id: &str, value: &FieldValue) -> Self {
        let mut set = Self::new();
        set.set(field_id, value);
        set
    }

    pub fn to_payload(&self) -> Value {
        json!({ "fields": Value::Object(self.0.clone()) })
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

fn reference(attr: RefAttr, s: &str) -> Value {
    let mut obj = Map::new();
    obj.insert(attr.as_str().to_string(), Value::String(s.to_string()));
    Value::Object(obj)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn strip_quotes(raw: &str) -> &str {
    for q in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}
