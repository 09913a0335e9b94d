use std::collections::BTreeMap;

use serde_json::Value as SerdeValue;

/// Tagged dynamic value the pipeline operates on. `Obj` uses a `BTreeMap` so
/// flattening and WAL-record emission are deterministic across runs, which
/// the round-trip law in the spec's testable properties depends on.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Arr(Vec<JsonValue>),
    Obj(BTreeMap<String, JsonValue>),
}

impl JsonValue {
    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    /// The first non-null element of an array, used by mapping inference's
    /// "homogeneous arrays assumed" rule.
    pub fn first_non_null(&self) -> Option<&JsonValue> {
        match self {
            JsonValue::Arr(items) => items.iter().find(|v| !v.is_null()),
            other => Some(other),
        }
    }
}

impl From<SerdeValue> for JsonValue {
    fn from(v: SerdeValue) -> Self {
        match v {
            SerdeValue::Null => JsonValue::Null,
            SerdeValue::Bool(b) => JsonValue::Bool(b),
            SerdeValue::Number(n) => JsonValue::Num(n.as_f64().unwrap_or(0.0)),
            SerdeValue::String(s) => JsonValue::Str(s),
            SerdeValue::Array(items) => JsonValue::Arr(items.into_iter().map(Into::into).collect()),
            SerdeValue::Object(map) => {
                JsonValue::Obj(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<JsonValue> for SerdeValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => SerdeValue::Null,
            JsonValue::Bool(b) => SerdeValue::Bool(b),
            JsonValue::Num(n) => serde_json::Number::from_f64(n)
                .map(SerdeValue::Number)
                .unwrap_or(SerdeValue::Null),
            JsonValue::Str(s) => SerdeValue::String(s),
            JsonValue::Arr(items) => SerdeValue::Array(items.into_iter().map(Into::into).collect()),
            JsonValue::Obj(map) => {
                SerdeValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Flattens nested objects to dotted paths. Arrays are left in place at
/// their path (they're handled element-wise by the caller), matching the
/// "arrays remain arrays at their path" rule in the Document Pipeline spec.
pub fn flatten(doc: &BTreeMap<String, JsonValue>) -> BTreeMap<String, JsonValue> {
    let mut out = BTreeMap::new();
    for (key, value) in doc {
        flatten_into(key.clone(), value, &mut out);
    }
    out
}

fn flatten_into(prefix: String, value: &JsonValue, out: &mut BTreeMap<String, JsonValue>) {
    match value {
        JsonValue::Obj(map) if !map.is_empty() => {
            for (key, v) in map {
                flatten_into(format!("{prefix}.{key}"), v, out);
            }
        }
        other => {
            out.insert(prefix, other.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: Vec<(&str, JsonValue)>) -> JsonValue {
        JsonValue::Obj(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn flattens_nested_objects_to_dotted_paths() {
        let mut doc = BTreeMap::new();
        doc.insert(
            "user".to_string(),
            obj(vec![("name", JsonValue::Str("ann".into())), ("age", JsonValue::Num(30.0))]),
        );
        doc.insert("qty".to_string(), JsonValue::Num(3.0));

        let flat = flatten(&doc);
        assert_eq!(flat.get("user.name"), Some(&JsonValue::Str("ann".into())));
        assert_eq!(flat.get("user.age"), Some(&JsonValue::Num(30.0)));
        assert_eq!(flat.get("qty"), Some(&JsonValue::Num(3.0)));
    }

    #[test]
    fn leaves_arrays_in_place() {
        let mut doc = BTreeMap::new();
        doc.insert(
            "tags".to_string(),
            JsonValue::Arr(vec![JsonValue::Str("a".into()), JsonValue::Str("b".into())]),
        );
        let flat = flatten(&doc);
        assert_eq!(
            flat.get("tags"),
            Some(&JsonValue::Arr(vec![JsonValue::Str("a".into()), JsonValue::Str("b".into())]))
        );
    }

    #[test]
    fn first_non_null_skips_leading_nulls() {
        let arr = JsonValue::Arr(vec![JsonValue::Null, JsonValue::Num(1.0)]);
        assert_eq!(arr.first_non_null(), Some(&JsonValue::Num(1.0)));
    }
}
