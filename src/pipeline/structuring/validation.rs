// Field-level validation and repair of loosely-typed LLM extraction output.
// Every declared field ends up present with either the extracted value or its
// default; a malformed field never aborts the record.

use serde_json::{Map, Value};

use super::schema::{FieldKind, FieldSpec, RecordSchema, SchemaRecord};

/// Why a raw field value was replaced with its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairReason {
    Missing,
    Null,
    WrongType { expected: &'static str, found: &'static str },
}

impl std::fmt::Display for RepairReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairReason::Missing => write!(f, "missing"),
            RepairReason::Null => write!(f, "null"),
            RepairReason::WrongType { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
        }
    }
}

/// One default substitution, with the dotted path of the field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRepair {
    pub path: String,
    pub reason: RepairReason,
    pub substituted: Value,
}

/// Result of validation: the typed record plus every substitution made.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub record: T,
    pub repairs: Vec<FieldRepair>,
}

/// Validate `raw` against `T`'s field table, substituting defaults.
pub fn validate_record<T: SchemaRecord>(raw: &Value) -> T {
    validate_with_report::<T>(raw).record
}

/// Same as [`validate_record`], but also reports every substitution.
pub fn validate_with_report<T: SchemaRecord>(raw: &Value) -> Validated<T> {
    let schema = T::schema();
    let mut repairs = Vec::new();
    let object = validate_object(raw, schema, "", &mut repairs);

    for repair in &repairs {
        tracing::warn!(
            record = schema.name,
            field = %repair.path,
            reason = %repair.reason,
            "Field failed validation, substituted default"
        );
    }

    let record = match serde_json::from_value::<T>(Value::Object(object)) {
        Ok(record) => record,
        Err(e) => {
            // Only reachable when a field table disagrees with its Rust type.
            tracing::error!(
                record = schema.name,
                error = %e,
                "Validated record did not deserialize, using record default"
            );
            T::default()
        }
    };

    Validated { record, repairs }
}

/// Walk one schema over a raw JSON value. Non-object input is treated as an
/// empty object, so every field degrades to its default.
pub fn validate_object(
    raw: &Value,
    schema: &RecordSchema,
    prefix: &str,
    repairs: &mut Vec<FieldRepair>,
) -> Map<String, Value> {
    let empty = Map::new();
    let source = raw.as_object().unwrap_or(&empty);
    let mut validated = Map::with_capacity(schema.fields.len());

    for spec in schema.fields {
        let path = if prefix.is_empty() {
            spec.name.to_string()
        } else {
            format!("{prefix}.{}", spec.name)
        };
        let value = match coerce_field(spec, source.get(spec.external_name()), &path, repairs) {
            Ok(value) => value,
            Err(reason) => {
                let substituted = spec.default.resolve(&spec.kind);
                repairs.push(FieldRepair {
                    path,
                    reason,
                    substituted: substituted.clone(),
                });
                substituted
            }
        };
        validated.insert(spec.name.to_string(), value);
    }

    validated
}

/// Try to accept a single raw value as the field's kind.
fn coerce_field(
    spec: &FieldSpec,
    raw: Option<&Value>,
    path: &str,
    repairs: &mut Vec<FieldRepair>,
) -> Result<Value, RepairReason> {
    let value = match raw {
        None => return Err(RepairReason::Missing),
        Some(Value::Null) => return Err(RepairReason::Null),
        Some(v) => v,
    };

    let wrong_type = || RepairReason::WrongType {
        expected: spec.kind.label(),
        found: json_type_name(value),
    };

    match spec.kind {
        FieldKind::Text => match value {
            Value::String(_) => Ok(value.clone()),
            // Bare numbers are common for ids and codes
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(wrong_type()),
        },
        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| wrong_type()),
            _ => Err(wrong_type()),
        },
        FieldKind::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from)
                .ok_or_else(wrong_type),
            _ => Err(wrong_type()),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(Value::Bool(true)),
                "false" | "no" => Ok(Value::Bool(false)),
                _ => Err(wrong_type()),
            },
            _ => Err(wrong_type()),
        },
        FieldKind::List => match value {
            Value::Array(_) => Ok(value.clone()),
            _ => Err(wrong_type()),
        },
        FieldKind::Map => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(wrong_type()),
        },
        FieldKind::Record(schema) => match value {
            Value::Object(_) => Ok(Value::Object(validate_object(value, schema, path, repairs))),
            _ => Err(wrong_type()),
        },
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
