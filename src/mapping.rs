use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::json_value::JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Text,
    Keyword,
    Numeric,
    Bool,
    Date,
}

/// One field's type and indexing flags. Sub-fields (e.g. a `text` field's
/// `.keyword` companion) are stored as additional top-level entries in the
/// owning `Mapping`, addressed by their own dotted path, plus a `fields`
/// list here so a writer knows which suffixes to also emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub property_type: PropertyType,
    pub indexed: bool,
    pub stored: bool,
    pub sortable: bool,
    pub aggregatable: bool,
    pub highlightable: bool,
    pub format: Option<String>,
    pub timezone: Option<String>,
    pub analyzer: Option<String>,
    pub fields: Vec<String>,
}

impl Property {
    pub fn new(property_type: PropertyType) -> Self {
        Property {
            property_type,
            indexed: true,
            stored: false,
            sortable: false,
            aggregatable: false,
            highlightable: false,
            format: None,
            timezone: None,
            analyzer: None,
            fields: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Structural equality ignoring `fields`/analyzer bookkeeping — used by
    /// `Mapping::set`'s idempotence check, which only cares whether the type
    /// (and parse format, for dates) still matches.
    fn conforms_to(&self, other: &Property) -> bool {
        self.property_type == other.property_type
            && (self.property_type != PropertyType::Date || self.format == other.format)
    }
}

/// Date layouts auto-detected on first sight of a string value, in spec order.
pub const DATE_LAYOUT_SPACE: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_LAYOUT_T: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_LAYOUT_RFC3339: &str = "rfc3339";
pub const DATE_LAYOUT_RFC3339_MILLIS: &str = "rfc3339-millis";

/// Detects which of the spec's four date layouts a string matches, by length
/// and separator position the same way the original implementation's
/// `detectTimeLayout` does for the two naive layouts; the two RFC 3339
/// layouts are told apart by trying `DateTime::parse_from_rfc3339` directly
/// rather than gating on an exact byte length first, since the offset can be
/// `Z` or `±HH:MM` and still be the same 19-byte date/time prefix.
pub fn detect_date_layout(value: &str) -> Option<&'static str> {
    let bytes = value.as_bytes();
    if value.len() == 19 && bytes.get(10) == Some(&b' ') {
        return parse_date(value, DATE_LAYOUT_SPACE, None).ok().map(|_| DATE_LAYOUT_SPACE);
    }
    if value.len() == 19 && bytes.get(10) == Some(&b'T') {
        return parse_date(value, DATE_LAYOUT_T, None).ok().map(|_| DATE_LAYOUT_T);
    }
    if bytes.get(10) == Some(&b'T') && DateTime::parse_from_rfc3339(value).is_ok() {
        return Some(if value.contains('.') { DATE_LAYOUT_RFC3339_MILLIS } else { DATE_LAYOUT_RFC3339 });
    }
    None
}

/// Parses a value under a Property's declared (or detected) format.
pub fn parse_date(value: &str, layout: &str, _timezone: Option<&str>) -> Result<DateTime<Utc>> {
    match layout {
        DATE_LAYOUT_SPACE => chrono::NaiveDateTime::parse_from_str(value, DATE_LAYOUT_SPACE)
            .map(|d| d.and_utc())
            .map_err(|e| Error::parsing(format!("date [{value}] parse err: {e}"))),
        DATE_LAYOUT_T => chrono::NaiveDateTime::parse_from_str(value, DATE_LAYOUT_T)
            .map(|d| d.and_utc())
            .map_err(|e| Error::parsing(format!("date [{value}] parse err: {e}"))),
        DATE_LAYOUT_RFC3339 | DATE_LAYOUT_RFC3339_MILLIS => DateTime::parse_from_rfc3339(value)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| Error::parsing(format!("date [{value}] parse err: {e}"))),
        other => Err(Error::parsing(format!("unknown date layout [{other}]"))),
    }
}

/// Ordered mapping from dotted field path to `Property`. Single-writer /
/// multi-reader: `parking_lot::RwLock` around a `BTreeMap` gives readers a
/// consistent, lock-free-ish view while one writer mutates.
pub struct Mapping {
    properties: RwLock<BTreeMap<String, Property>>,
}

impl Mapping {
    pub fn new() -> Self {
        Mapping { properties: RwLock::new(BTreeMap::new()) }
    }

    pub fn get(&self, path: &str) -> Option<Property> {
        self.properties.read().get(path).cloned()
    }

    /// Idempotent for an equal property; rejects conflicting retyping rather
    /// than silently overwriting it, uniformly across scalar and array
    /// inference paths (see SPEC_FULL.md §4.2's resolved Open Question).
    pub fn set(&self, path: &str, property: Property) -> Result<()> {
        let mut props = self.properties.write();
        match props.get(path) {
            Some(existing) if existing.conforms_to(&property) => Ok(()),
            Some(existing) => Err(Error::validation(format!(
                "field [{path}] is already mapped as {:?}, cannot retype to {:?}",
                existing.property_type, property.property_type
            ))),
            None => {
                props.insert(path.to_string(), property);
                Ok(())
            }
        }
    }

    pub fn iter(&self) -> Vec<(String, Property)> {
        self.properties.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Property> {
        self.properties.read().clone()
    }

    pub fn load(properties: BTreeMap<String, Property>) -> Self {
        Mapping { properties: RwLock::new(properties) }
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Mapping::new()
    }
}

impl Clone for Property {
    fn clone(&self) -> Self {
        Property {
            property_type: self.property_type,
            indexed: self.indexed,
            stored: self.stored,
            sortable: self.sortable,
            aggregatable: self.aggregatable,
            highlightable: self.highlightable,
            format: self.format.clone(),
            timezone: self.timezone.clone(),
            analyzer: self.analyzer.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Infers a `Property` for a previously-unseen field from its first
/// non-null value, following the rules in SPEC_FULL.md §4.2. Returns the
/// primary property plus any sub-field `(suffix, property)` pairs to also
/// register (only the `text` → `.keyword` case, gated by config).
pub fn infer_property(value: &JsonValue, enable_text_keyword_mapping: bool) -> (Property, Vec<(String, Property)>) {
    let sample = value.first_non_null().cloned().unwrap_or(JsonValue::Null);
    match sample {
        JsonValue::Str(s) => {
            if let Some(layout) = detect_date_layout(&s) {
                (Property::new(PropertyType::Date).with_format(layout), Vec::new())
            } else {
                let mut prop = Property::new(PropertyType::Text);
                let mut subs = Vec::new();
                if enable_text_keyword_mapping {
                    prop.fields.push("keyword".to_string());
                    subs.push(("keyword".to_string(), Property::new(PropertyType::Keyword)));
                }
                (prop, subs)
            }
        }
        JsonValue::Num(_) => (Property::new(PropertyType::Numeric), Vec::new()),
        JsonValue::Bool(_) => (Property::new(PropertyType::Bool), Vec::new()),
        JsonValue::Null | JsonValue::Arr(_) | JsonValue::Obj(_) => {
            (Property::new(PropertyType::Text), Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_all_four_layouts() {
        assert_eq!(detect_date_layout("2023-01-02 03:04:05"), Some(DATE_LAYOUT_SPACE));
        assert_eq!(detect_date_layout("2023-01-02T03:04:05"), Some(DATE_LAYOUT_T));
        assert_eq!(detect_date_layout("2023-01-02T03:04:05Z"), Some(DATE_LAYOUT_RFC3339));
        assert_eq!(detect_date_layout("2023-01-02T03:04:05.999Z"), Some(DATE_LAYOUT_RFC3339_MILLIS));
        assert_eq!(detect_date_layout("not a date"), None);
    }

    #[test]
    fn infers_text_with_keyword_subfield_when_enabled() {
        let (prop, subs) = infer_property(&JsonValue::Str("hello".into()), true);
        assert_eq!(prop.property_type, PropertyType::Text);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].0, "keyword");
        assert_eq!(subs[0].1.property_type, PropertyType::Keyword);
    }

    #[test]
    fn infers_numeric_bool_date() {
        assert_eq!(infer_property(&JsonValue::Num(3.0), false).0.property_type, PropertyType::Numeric);
        assert_eq!(infer_property(&JsonValue::Bool(true), false).0.property_type, PropertyType::Bool);
        assert_eq!(
            infer_property(&JsonValue::Str("2023-01-02T03:04:05Z".into()), false).0.property_type,
            PropertyType::Date
        );
    }

    #[test]
    fn array_inference_uses_first_non_null_element() {
        let arr = JsonValue::Arr(vec![JsonValue::Null, JsonValue::Num(1.0), JsonValue::Num(2.0)]);
        assert_eq!(infer_property(&arr, false).0.property_type, PropertyType::Numeric);
    }

    #[test]
    fn mapping_set_is_idempotent_for_equal_properties() {
        let mapping = Mapping::new();
        mapping.set("qty", Property::new(PropertyType::Numeric)).unwrap();
        mapping.set("qty", Property::new(PropertyType::Numeric)).unwrap();
        assert_eq!(mapping.get("qty").unwrap().property_type, PropertyType::Numeric);
    }

    #[test]
    fn mapping_set_rejects_conflicting_retype() {
        let mapping = Mapping::new();
        mapping.set("qty", Property::new(PropertyType::Numeric)).unwrap();
        let err = mapping.set("qty", Property::new(PropertyType::Text)).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }
}
