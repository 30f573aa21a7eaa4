//! Tenant field lists compiled into typed schemas.
//!
//! Field kinds form a closed set with one native type each; there is no
//! string-keyed type lookup at runtime.

use chrono::{DateTime, SecondsFormat, Utc};
use kennel_core::{CollectionDef, FieldKind};
use serde_json::{Map, Value};

use crate::{DocError, DocResult};

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Utf8,
    Float64,
    Bool,
    Timestamp,
}

impl NativeType {
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::String => NativeType::Utf8,
            FieldKind::Number => NativeType::Float64,
            FieldKind::Boolean => NativeType::Bool,
            FieldKind::Date => NativeType::Timestamp,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NativeType::Utf8 => "string",
            NativeType::Float64 => "number",
            NativeType::Bool => "boolean",
            NativeType::Timestamp => "date",
        }
    }

    /// Check `value` against this type, normalizing timestamps to RFC 3339 UTC.
    fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (NativeType::Utf8, v @ Value::String(_)) => Some(v),
            (NativeType::Float64, v @ Value::Number(_)) => Some(v),
            (NativeType::Bool, v @ Value::Bool(_)) => Some(v),
            (NativeType::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| Value::String(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))),
            (NativeType::Timestamp, Value::Number(n)) => n
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub key: String,
    pub native: NativeType,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSchema {
    pub fields: Vec<SchemaField>,
    /// Maintain `createdAt` / `updatedAt` on every write.
    pub timestamps: bool,
}

impl CompiledSchema {
    pub fn compile(def: &CollectionDef) -> Self {
        Self {
            fields: def
                .fields
                .iter()
                .map(|f| SchemaField {
                    key: f.key.clone(),
                    native: NativeType::for_kind(f.kind),
                    required: f.required,
                })
                .collect(),
            timestamps: true,
        }
    }

    /// Validate a new document and shape it for storage.
    ///
    /// Undeclared keys are dropped, required keys must be present and
    /// non-null, and timestamps are stamped with `now`.
    pub fn prepare(&self, document: Value, now: DateTime<Utc>) -> DocResult<Map<String, Value>> {
        let mut input = match document {
            Value::Object(map) => map,
            other => {
                return Err(DocError::validation(format!(
                    "document must be an object, got {}",
                    json_type(&other)
                )))
            }
        };

        let mut out = Map::new();
        for field in &self.fields {
            match input.remove(&field.key) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(DocError::validation(format!(
                            "field '{}' is required",
                            field.key
                        )));
                    }
                }
                Some(value) => {
                    let found = json_type(&value);
                    let coerced = field.native.coerce(value).ok_or_else(|| {
                        DocError::validation(format!(
                            "field '{}' expects {}, got {}",
                            field.key,
                            field.native.name(),
                            found
                        ))
                    })?;
                    out.insert(field.key.clone(), coerced);
                }
            }
        }

        if self.timestamps {
            let stamp = Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true));
            out.insert(CREATED_AT.to_string(), stamp.clone());
            out.insert(UPDATED_AT.to_string(), stamp);
        }
        Ok(out)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
