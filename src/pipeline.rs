use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value as SerdeValue;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::json_value::{flatten, JsonValue};
use crate::mapping::{infer_property, parse_date, Mapping, Property, PropertyType};
use crate::segment::IndexedField;
use crate::wal::Action;

pub const ID_FIELD: &str = "_id";
pub const INDEX_FIELD: &str = "_index";
pub const ACTION_FIELD: &str = "_action";
pub const SHARD_FIELD: &str = "_shard";
pub const TIMESTAMP_FIELD: &str = "_timestamp";

/// Everything the pipeline produced for one document: the full WAL record
/// (flattened document plus reserved keys), the `_source` bytes that will
/// eventually be retrievable, and the fields to index.
pub struct PipelineOutput {
    pub record_json: Vec<u8>,
    pub source_json: Vec<u8>,
    pub indexed_fields: Vec<IndexedField>,
    pub timestamp_nanos: i64,
    pub mapping_dirty: bool,
}

/// Runs the stages in spec §4.8 for one incoming document: flatten, infer
/// missing mapping entries, coerce every value to its Property's type,
/// resolve the effective timestamp, and build the WAL record.
pub fn process(
    mapping: &Mapping,
    config: &Config,
    index_name: &str,
    doc_id: &str,
    action: Action,
    doc: JsonValue,
    target_shard: i64,
) -> Result<PipelineOutput> {
    let JsonValue::Obj(top) = doc else {
        return Err(Error::parsing("document body must be a JSON object"));
    };
    let flat = flatten(&top);

    let mut mapping_dirty = false;
    for (path, value) in &flat {
        if value.is_null() || path == &config.time_field {
            continue;
        }
        if mapping.get(path).is_none() {
            let (prop, subs) = infer_property(value, config.enable_text_keyword_mapping);
            mapping.set(path, prop)?;
            for (suffix, sub_prop) in subs {
                mapping.set(&format!("{path}.{suffix}"), sub_prop)?;
            }
            mapping_dirty = true;
        }
    }

    let mut coerced: BTreeMap<String, JsonValue> = BTreeMap::new();
    let mut indexed_fields = Vec::new();
    for (path, value) in &flat {
        if value.is_null() {
            continue;
        }
        if path == &config.time_field {
            continue;
        }
        let prop = mapping.get(path).expect("inferred or already present above");
        let coerced_value = coerce_value(path, value, &prop)?;
        push_indexed(&mut indexed_fields, path, &coerced_value, &prop);
        for suffix in &prop.fields {
            if let Some(sub_prop) = mapping.get(&format!("{path}.{suffix}")) {
                push_indexed(&mut indexed_fields, &format!("{path}.{suffix}"), &coerced_value, &sub_prop);
            }
        }
        coerced.insert(path.clone(), coerced_value);
    }

    let source_json = serde_json::to_vec(&to_serde_map(&coerced))
        .map_err(|e| Error::runtime(format!("failed to serialize _source: {e}")))?;

    let (timestamp_nanos, time_field_dirty) = resolve_timestamp(mapping, config, &flat)?;
    let mapping_dirty = mapping_dirty || time_field_dirty;

    let mut record = coerced;
    record.insert(ID_FIELD.to_string(), JsonValue::Str(doc_id.to_string()));
    record.insert(INDEX_FIELD.to_string(), JsonValue::Str(index_name.to_string()));
    record.insert(ACTION_FIELD.to_string(), JsonValue::Str(action_name(action).to_string()));
    record.insert(SHARD_FIELD.to_string(), JsonValue::Num(target_shard as f64));
    record.insert(TIMESTAMP_FIELD.to_string(), JsonValue::Num(timestamp_nanos as f64));

    let record_json = serde_json::to_vec(&to_serde_map(&record))
        .map_err(|e| Error::runtime(format!("failed to serialize WAL record: {e}")))?;

    Ok(PipelineOutput { record_json, source_json, indexed_fields, timestamp_nanos, mapping_dirty })
}

fn action_name(action: Action) -> &'static str {
    match action {
        Action::Insert => "insert",
        Action::Update => "update",
        Action::Delete => "delete",
    }
}

/// Resolves the effective document timestamp from the time field, and
/// registers its `Property` in `mapping` the first time it's seen —
/// mirroring how `index_document.go`'s `CheckDocument` looks up the
/// time-field property and sets it if absent, instead of only ever reading
/// it. Returns `(timestamp_nanos, newly_registered)`.
fn resolve_timestamp(mapping: &Mapping, config: &Config, flat: &BTreeMap<String, JsonValue>) -> Result<(i64, bool)> {
    match flat.get(&config.time_field) {
        Some(JsonValue::Str(s)) => {
            let existing = mapping.get(&config.time_field);
            let layout = match existing.as_ref().and_then(|p| p.format.clone()) {
                Some(l) => l,
                None => crate::mapping::detect_date_layout(s)
                    .ok_or_else(|| Error::validation(format!("field [{}] value [{s}] is not a recognized date", config.time_field)))?
                    .to_string(),
            };
            let timezone = existing.as_ref().and_then(|p| p.timezone.clone());
            let parsed = parse_date(s, &layout, timezone.as_deref())?;

            let newly_registered = existing.is_none();
            if newly_registered {
                mapping.set(&config.time_field, Property::new(PropertyType::Date).with_format(layout))?;
            }

            Ok((parsed.timestamp_nanos_opt().unwrap_or(0), newly_registered))
        }
        Some(_) | None => Ok((Utc::now().timestamp_nanos_opt().unwrap_or(0), false)),
    }
}

fn push_indexed(out: &mut Vec<IndexedField>, path: &str, value: &JsonValue, prop: &Property) {
    if !prop.indexed {
        return;
    }
    let tokenize = prop.property_type == PropertyType::Text;
    match value {
        JsonValue::Arr(items) => {
            for item in items {
                if let Some(s) = value_to_string(item) {
                    out.push(IndexedField { name: path.to_string(), value: s, tokenize });
                }
            }
        }
        other => {
            if let Some(s) = value_to_string(other) {
                out.push(IndexedField { name: path.to_string(), value: s, tokenize });
            }
        }
    }
}

fn value_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Str(s) => Some(s.clone()),
        JsonValue::Num(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null => None,
        JsonValue::Arr(_) | JsonValue::Obj(_) => None,
    }
}

/// Coerces one (possibly array-valued) field to its Property's declared
/// type, per spec §4.8 stage 3. Coercion dispatches purely on the
/// Property's type, never on the value's own shape, per the Design Note
/// in SPEC_FULL.md §3.1.
fn coerce_value(path: &str, value: &JsonValue, prop: &Property) -> Result<JsonValue> {
    match value {
        JsonValue::Arr(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(coerce_scalar(path, item, prop)?);
            }
            Ok(JsonValue::Arr(out))
        }
        other => coerce_scalar(path, other, prop),
    }
}

fn coerce_scalar(path: &str, value: &JsonValue, prop: &Property) -> Result<JsonValue> {
    match prop.property_type {
        PropertyType::Text | PropertyType::Keyword => to_string_coerce(value)
            .map(JsonValue::Str)
            .ok_or_else(|| type_error(path, prop.property_type, value, "string")),
        PropertyType::Numeric => to_float64_coerce(value)
            .map(JsonValue::Num)
            .ok_or_else(|| type_error(path, prop.property_type, value, "numeric")),
        PropertyType::Bool => to_bool_coerce(value)
            .map(JsonValue::Bool)
            .ok_or_else(|| type_error(path, prop.property_type, value, "bool")),
        PropertyType::Date => {
            let s = match value {
                JsonValue::Str(s) => s.clone(),
                _ => return Err(type_error(path, prop.property_type, value, "date")),
            };
            let layout = prop.format.as_deref().unwrap_or(crate::mapping::DATE_LAYOUT_RFC3339);
            parse_date(&s, layout, prop.timezone.as_deref())?;
            Ok(JsonValue::Str(s))
        }
    }
}

fn type_error(path: &str, ty: PropertyType, value: &JsonValue, target: &str) -> Error {
    Error::validation(format!(
        "field [{path}] was set type to [{ty:?}] but the value [{value:?}] can't convert to {target}"
    ))
}

fn to_string_coerce(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Str(s) => Some(s.clone()),
        JsonValue::Num(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null | JsonValue::Arr(_) | JsonValue::Obj(_) => None,
    }
}

fn to_float64_coerce(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Num(n) => Some(*n),
        JsonValue::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn to_bool_coerce(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Str(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_serde_map(map: &BTreeMap<String, JsonValue>) -> SerdeValue {
    SerdeValue::Object(map.iter().map(|(k, v)| (k.clone(), v.clone().into())).collect())
}
