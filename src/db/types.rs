//! Canonical row conversion.
//!
//! Engine-native rows are converted into JSON objects keyed by column name.
//!
//! # Architecture
//!
//! Conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Engine-specific decoders handle the actual value extraction

use crate::models::EngineKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgValueFormat};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};

/// A canonical result row: column name to JSON value.
pub type Row = serde_json::Map<String, JsonValue>;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    /// DATE, TIME, DATETIME, TIMESTAMP and their zoned variants
    Temporal,
    Other,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, engine: EngineKind) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first: "numeric" would otherwise fall through to the float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower == "uuid" {
        // MySQL has no native UUID type; such columns are plain strings
        if engine == EngineKind::MySQL {
            return TypeCategory::Other;
        }
        return TypeCategory::Uuid;
    }

    if lower == "date"
        || lower.starts_with("time")
        || lower.contains("datetime")
        || lower.starts_with("timestamp")
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // varchar, text, char, enum, ...
    TypeCategory::Other
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw MySQL DECIMAL value kept as its exact textual representation.
///
/// MySQL sends DECIMAL as text on both protocols. Postgres NUMERIC goes
/// through `sqlx::types::Decimal` instead.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Encode binary column data as a base64 JSON string.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

/// Zoned timestamps are rendered in UTC with a `Z` suffix.
fn timestamp_value(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn naive_datetime_value(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn date_value(v: NaiveDate) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%d").to_string())
}

fn time_value(v: NaiveTime) -> JsonValue {
    JsonValue::String(v.format("%H:%M:%S%.f").to_string())
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row Conversion
// =============================================================================

/// Conversion of an engine-native row into a canonical row.
pub trait IntoCanonicalRow {
    fn to_canonical(&self) -> Row;
}

impl IntoCanonicalRow for MySqlRow {
    fn to_canonical(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, EngineKind::MySQL);
                let value = mysql::decode_column(self, col.ordinal(), type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl IntoCanonicalRow for PgRow {
    fn to_canonical(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let category = categorize_type(col.type_info().name(), EngineKind::PostgreSQL);
                let value = postgres::decode_column(self, col.ordinal(), category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl IntoCanonicalRow for SqliteRow {
    fn to_canonical(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let idx = col.ordinal();
                // Expression columns carry no declared type; use the stored value's type
                let type_name = if col.type_info().is_null() {
                    self.try_get_raw(idx)
                        .map(|v| v.type_info().name().to_string())
                        .unwrap_or_default()
                } else {
                    col.type_info().name().to_string()
                };
                let category = categorize_type(&type_name, EngineKind::SQLite);
                let value = sqlite::decode_column(self, idx, &type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Engine-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            TypeCategory::Uuid | TypeCategory::Other => decode_text(row, idx, type_name),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // Unsigned columns
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    /// DATETIME has no zone and stays naive; TIMESTAMP is stored in UTC.
    fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        let decoded = match type_name.to_uppercase().as_str() {
            "TIMESTAMP" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map(timestamp_value)),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map(date_value)),
            "TIME" => row
                .try_get::<Option<NaiveTime>, _>(idx)
                .map(|v| v.map(time_value)),
            _ => row
                .try_get::<Option<NaiveDateTime>, _>(idx)
                .map(|v| v.map(naive_datetime_value)),
        };
        match decoded {
            Ok(v) => v.unwrap_or(JsonValue::Null),
            Err(e) => {
                // TIME values outside 00:00..24:00 do not fit NaiveTime
                tracing::debug!("Failed to decode {}: {:?}", type_name, e);
                decode_text(row, idx, type_name)
            }
        }
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        JsonValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Other => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<sqlx::types::Decimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.to_string()),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return v.map(timestamp_value).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return v.map(naive_datetime_value).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return v.map(date_value).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return v.map(time_value).unwrap_or(JsonValue::Null);
        }
        // TIMETZ has no chrono counterpart; keep the server's text
        match row.try_get_raw(idx) {
            Ok(v) if !v.is_null() && v.format() == PgValueFormat::Text => v
                .as_str()
                .map(|s| JsonValue::String(s.to_string()))
                .unwrap_or(JsonValue::Null),
            _ => JsonValue::Null,
        }
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Decimal => decode_numeric(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            // Dates and UUIDs are stored as text
            TypeCategory::Json
            | TypeCategory::Uuid
            | TypeCategory::Temporal
            | TypeCategory::Other => decode_text(row, idx, type_name),
        }
    }

    /// NUMERIC affinity stores INTEGER or REAL; render by storage class so
    /// the value matches what an undeclared column would produce.
    fn decode_numeric(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v
                .map(|v| JsonValue::Number(v.into()))
                .unwrap_or(JsonValue::Null);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::Number(v.into()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(float_value)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &SqliteRow, idx: usize, type_name: &str) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        JsonValue::Null
    }
}
