//! Declarative field tables for LLM-extracted records.
//!
//! Each record type publishes a static `RecordSchema`: one `FieldSpec` per
//! declared field with its wire alias, expected kind and default. The
//! validator walks this table instead of reflecting over the Rust type.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Placeholder stored in text fields that could not be extracted.
pub const NOT_PROVIDED: &str = "Not provided";

/// The value shape a field accepts.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    List,
    Map,
    /// Nested record, validated field-by-field against its own schema.
    Record(&'static RecordSchema),
}

impl FieldKind {
    /// Default inferred from the kind alone, used when a field declares none.
    pub fn inferred_default(&self) -> Value {
        match self {
            FieldKind::Text => Value::String(NOT_PROVIDED.to_string()),
            FieldKind::Integer => Value::from(0),
            FieldKind::Float => Value::from(0.0),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::List => Value::Array(Vec::new()),
            FieldKind::Map => Value::Object(Map::new()),
            FieldKind::Record(_) => Value::Null,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::List => "list",
            FieldKind::Map => "map",
            FieldKind::Record(schema) => schema.name,
        }
    }
}

/// Declared default of a field.
///
/// Explicit values win over a factory, a factory wins over the inferred
/// default of the field kind.
#[derive(Debug, Clone, Copy)]
pub enum FieldDefault {
    Inferred,
    Text(&'static str),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Factory(fn() -> Value),
}

impl FieldDefault {
    pub fn resolve(&self, kind: &FieldKind) -> Value {
        match self {
            FieldDefault::Text(s) => Value::String((*s).to_string()),
            FieldDefault::Integer(n) => Value::from(*n),
            FieldDefault::Float(f) => Value::from(*f),
            FieldDefault::Boolean(b) => Value::Bool(*b),
            FieldDefault::Factory(factory) => factory(),
            FieldDefault::Inferred => kind.inferred_default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name on the Rust record.
    pub name: &'static str,
    /// External name in the raw LLM output, when it differs from `name`.
    pub alias: Option<&'static str>,
    pub kind: FieldKind,
    pub default: FieldDefault,
}

impl FieldSpec {
    /// Text field defaulting to [`NOT_PROVIDED`].
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            alias: None,
            kind: FieldKind::Text,
            default: FieldDefault::Text(NOT_PROVIDED),
        }
    }

    /// Nested record field whose default is built by `factory`.
    pub const fn record(
        name: &'static str,
        schema: &'static RecordSchema,
        factory: fn() -> Value,
    ) -> Self {
        Self {
            name,
            alias: None,
            kind: FieldKind::Record(schema),
            default: FieldDefault::Factory(factory),
        }
    }

    pub const fn with_alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn external_name(&self) -> &'static str {
        self.alias.unwrap_or(self.name)
    }
}

#[derive(Debug)]
pub struct RecordSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A typed record backed by a field table.
pub trait SchemaRecord: DeserializeOwned + Default {
    fn schema() -> &'static RecordSchema;
}

/// Default value of a schema record as JSON, for use as a field factory.
pub fn record_default<T: SchemaRecord + serde::Serialize>() -> Value {
    serde_json::to_value(T::default()).unwrap_or(Value::Null)
}
