//! Key-field metadata and schema helpers shared by the lowering layer.

use std::collections::HashSet;
use std::fmt;

use arrow_schema::{DataType, Field, Schema, TimeUnit};
use serde::{Deserialize, Serialize};
use ssq_common::{Result, SsqError};

use crate::logical_plan::ColumnRef;

/// The field that identifies a stream's physical partitioning key.
///
/// `index` is `None` for a synthetic key that is not a column of the node's
/// output schema (for example the composite key of a repartitioning GROUP BY).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyField {
    pub name: String,
    pub index: Option<usize>,
    pub data_type: DataType,
}

impl KeyField {
    pub fn new(name: impl Into<String>, index: usize, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
            data_type,
        }
    }

    pub fn synthetic(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            index: None,
            data_type,
        }
    }

    /// Key field for the column at `index` of `schema`.
    pub fn from_schema(schema: &Schema, index: usize) -> Self {
        let f = schema.field(index);
        Self::new(f.name().clone(), index, f.data_type().clone())
    }

    pub fn is_synthetic(&self) -> bool {
        self.index.is_none()
    }

    /// Key name with any `ALIAS.` prefix removed.
    pub fn unaliased_name(&self) -> &str {
        strip_alias(&self.name)
    }

    /// Same logical key moved to a new position (and possibly renamed).
    pub fn relocated(&self, name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
            data_type: self.data_type.clone(),
        }
    }

    /// True when `column` refers to this key.
    ///
    /// Either side may carry a source qualifier. When both do they must agree;
    /// otherwise the unqualified names are compared.
    pub fn matches_column(&self, column: &ColumnRef) -> bool {
        if self.name == column.full_name() {
            return true;
        }
        let (key_qualifier, key_name) = split_alias(&self.name);
        match (key_qualifier, column.qualifier.as_deref()) {
            (Some(kq), Some(cq)) if kq != cq => false,
            _ => key_name == column.name,
        }
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}@{i}", self.name),
            None => write!(f, "{}@-", self.name),
        }
    }
}

/// Whether a stream's record key carries a time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyFormat {
    Plain,
    Windowed,
}

impl KeyFormat {
    pub fn is_windowed(self) -> bool {
        matches!(self, KeyFormat::Windowed)
    }
}

/// Split `ALIAS.NAME` into its parts.
pub fn split_alias(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((alias, rest)) => (Some(alias), rest),
        None => (None, name),
    }
}

pub fn strip_alias(name: &str) -> &str {
    split_alias(name).1
}

/// Position of the field named `name`.
pub fn field_index(schema: &Schema, name: &str) -> Option<usize> {
    schema.fields().iter().position(|f| f.name() == name)
}

/// Position of the field `column` refers to.
///
/// Tries the full (qualified) name first, then the bare name when it is
/// unambiguous.
pub fn resolve_column(schema: &Schema, column: &ColumnRef) -> Result<usize> {
    let full = column.full_name();
    if let Some(idx) = field_index(schema, &full) {
        return Ok(idx);
    }
    let matches = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            let (alias, name) = split_alias(f.name());
            name == column.name
                && match (alias, column.qualifier.as_deref()) {
                    (Some(a), Some(q)) => a == q,
                    _ => true,
                }
        })
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    match matches.as_slice() {
        [idx] => Ok(*idx),
        [] => Err(SsqError::TypeResolution(format!("unknown column '{full}'"))),
        _ => Err(SsqError::TypeResolution(format!(
            "ambiguous column reference '{full}' (qualify it with a source alias)"
        ))),
    }
}

/// Reject schemas with repeated field names.
pub fn ensure_unique_field_names<'a>(fields: impl IntoIterator<Item = &'a Field>) -> Result<()> {
    let mut seen = HashSet::new();
    for f in fields {
        if !seen.insert(f.name().as_str()) {
            return Err(SsqError::TypeMismatch(format!(
                "duplicate field name '{}' in schema",
                f.name()
            )));
        }
    }
    Ok(())
}

/// SQL spelling of a column type.
pub fn sql_type_name(dt: &DataType) -> String {
    match dt {
        DataType::Null => "NULL".to_string(),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Int32 => "INT".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Utf8 => "VARCHAR".to_string(),
        DataType::Time32(TimeUnit::Millisecond) => "TIME".to_string(),
        other => format!("{other:?}").to_ascii_uppercase(),
    }
}

/// `[NAME : TYPE, ...]`
pub fn schema_definition_string(schema: &Schema) -> String {
    let cols = schema
        .fields()
        .iter()
        .map(|f| format!("{} : {}", f.name(), sql_type_name(f.data_type())))
        .collect::<Vec<_>>();
    format!("[{}]", cols.join(", "))
}
