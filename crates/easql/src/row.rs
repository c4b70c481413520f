//! Row mapping traits and utilities
//!
//! Drivers hand back owned [`Record`]s; destinations decode themselves from a
//! [`RowView`], which pairs a record with the pool's [`NameMapper`] so struct
//! field names can be translated to column names.

use crate::error::MappingError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use heck::ToSnakeCase;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Json, Type};
use uuid::Uuid;

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
    Json(serde_json::Value),
    /// A column whose type has no owned representation here (arrays,
    /// enums, `interval`, `inet`, ...). It only fails when decoded.
    Unsupported { type_name: String },
}

impl Value {
    fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytea",
            Value::Decimal(_) => "numeric",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
            Value::Unsupported { type_name } => type_name,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_value_from!(
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    Decimal => Decimal,
    DateTime<Utc> => Timestamp,
    NaiveDate => Date,
    NaiveTime => Time,
    Uuid => Uuid,
    serde_json::Value => Json,
);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An owned result row: ordered column names with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record from `(column, value)` pairs.
    pub fn new<I, C, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Build a record sharing a column list with its siblings.
    ///
    /// Returns `None` when `columns` and `values` differ in length.
    pub fn with_columns(columns: Arc<[String]>, values: Vec<Value>) -> Option<Self> {
        (columns.len() == values.len()).then_some(Self { columns, values })
    }

    /// Convert a Postgres row, decoding each column by its declared type.
    pub fn from_pg_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        let columns: Arc<[String]> = row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        Self::from_pg_row_with_columns(row, columns)
    }

    pub(crate) fn from_pg_row_with_columns(
        row: &Row,
        columns: Arc<[String]>,
    ) -> Result<Self, tokio_postgres::Error> {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in row.columns().iter().enumerate() {
            values.push(decode_pg_column(row, idx, column.type_())?);
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of `column` in this record.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|i| &self.values[i])
    }
}

fn decode_pg_column(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(Value::from),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(Value::Decimal),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::Timestamp),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| Value::Timestamp(v.and_utc())),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx)?.map(Value::Time),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.map(Value::Uuid),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        // text, varchar, bpchar, name, citext and friends
        _ if <String as FromSql>::accepts(ty) => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        // NULL stays NULL whatever the type; anything else waits for a
        // destination to ask for it
        _ => match row.try_get::<_, Option<RawValue>>(idx)? {
            None => None,
            Some(RawValue) => Some(Value::Unsupported {
                type_name: ty.name().to_string(),
            }),
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Accepts any column type and only records whether it is NULL.
struct RawValue;

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(
        _: &Type,
        _: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawValue)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Translates destination field names into column names.
///
/// The default is the identity mapping.
#[derive(Clone, Default)]
pub struct NameMapper(Option<Arc<dyn Fn(&str) -> String + Send + Sync>>);

impl NameMapper {
    /// Use a custom mapping function.
    pub fn new(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    /// Field names are used as column names unchanged.
    pub fn identity() -> Self {
        Self(None)
    }

    /// Lower-case every field name.
    pub fn lowercase() -> Self {
        Self::new(|name| name.to_lowercase())
    }

    /// Convert field names to `snake_case`.
    pub fn snake_case() -> Self {
        Self::new(|name| name.to_snake_case())
    }

    /// Map a field name to its column name.
    pub fn map<'a>(&self, field: &'a str) -> Cow<'a, str> {
        match &self.0 {
            Some(f) => Cow::Owned(f(field)),
            None => Cow::Borrowed(field),
        }
    }
}

impl fmt::Debug for NameMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.0.is_some() { "custom" } else { "identity" };
        f.debug_tuple("NameMapper").field(&kind).finish()
    }
}

/// A record paired with the field-name mapper of the driver that produced it.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    record: &'a Record,
    mapper: &'a NameMapper,
}

impl<'a> RowView<'a> {
    pub fn new(record: &'a Record, mapper: &'a NameMapper) -> Self {
        Self { record, mapper }
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    /// Decode the column a destination field maps to.
    pub fn get<T: FromValue>(&self, field: &str) -> Result<T, MappingError> {
        let column = self.mapper.map(field);
        self.get_column(&column)
    }

    /// Decode a column by its exact name, bypassing the mapper.
    pub fn get_column<T: FromValue>(&self, column: &str) -> Result<T, MappingError> {
        let value = self
            .record
            .value(column)
            .ok_or_else(|| MappingError::MissingColumn(column.to_string()))?;
        T::from_value(value).map_err(|message| MappingError::decode(column, message))
    }

    /// Decode a column by position.
    pub fn get_index<T: FromValue>(&self, index: usize) -> Result<T, MappingError> {
        let value = self
            .record
            .values()
            .get(index)
            .ok_or(MappingError::IndexOutOfRange {
                index,
                len: self.record.len(),
            })?;
        T::from_value(value).map_err(|message| {
            let column = self
                .record
                .columns()
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("#{index}"));
            MappingError::decode(column, message)
        })
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

/// Conversion from a single column value.
pub trait FromValue: Sized {
    /// Convert `value`, or describe why it cannot be converted.
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T, String> {
    if value.is_null() {
        Err(format!("converting NULL to {expected} is unsupported"))
    } else {
        Err(format!("cannot convert {} to {expected}", value.type_name()))
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, String> {
                    match value {
                        Value::Int(v) => <$ty>::try_from(*v)
                            .map_err(|_| format!("value {v} out of range for {}", stringify!($ty))),
                        other => mismatch(stringify!($ty), other),
                    }
                }
            }
        )*
    };
}

impl_from_value_int!(i16, i32, i64, u32, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::Decimal(v) => v
                .to_f64()
                .ok_or_else(|| format!("value {v} out of range for f64")),
            other => mismatch("f64", other),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => mismatch("bool", other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            Value::Uuid(v) => Ok(v.to_string()),
            Value::Decimal(v) => Ok(v.to_string()),
            other => mismatch("String", other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            Value::Text(v) => Ok(v.clone().into_bytes()),
            other => mismatch("Vec<u8>", other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            other => mismatch("DateTime<Utc>", other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        DateTime::<Utc>::from_value(value).map(|v| v.naive_utc())
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Date(v) => Ok(*v),
            Value::Timestamp(v) => Ok(v.date_naive()),
            other => mismatch("NaiveDate", other),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Decimal(v) => Ok(*v),
            Value::Int(v) => Ok(Decimal::from(*v)),
            other => mismatch("Decimal", other),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Time(v) => Ok(*v),
            other => mismatch("NaiveTime", other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::Text(v) => Uuid::parse_str(v).map_err(|e| e.to_string()),
            other => mismatch("Uuid", other),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Null => Ok(serde_json::Value::Null),
            other => mismatch("serde_json::Value", other),
        }
    }
}

impl<T: DeserializeOwned> FromValue for Json<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Json(v) => serde_json::from_value(v.clone())
                .map(Json)
                .map_err(|e| e.to_string()),
            other => mismatch("Json<T>", other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Trait for decoding a result row into a destination value.
///
/// Scalars decode from the first column, tuples by position, and structs
/// (usually via `#[derive(FromRow)]`) by mapped field name.
pub trait FromRow: Sized {
    fn from_row(row: &RowView<'_>) -> Result<Self, MappingError>;
}

macro_rules! impl_from_row_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: &RowView<'_>) -> Result<Self, MappingError> {
                    row.get_index(0)
                }
            }
        )*
    };
}

impl_from_row_scalar!(
    bool,
    i16,
    i32,
    i64,
    u32,
    u64,
    f32,
    f64,
    String,
    Vec<u8>,
    Decimal,
    DateTime<Utc>,
    NaiveDateTime,
    NaiveDate,
    NaiveTime,
    Uuid,
    serde_json::Value,
);

impl<T: FromValue> FromRow for Option<T> {
    fn from_row(row: &RowView<'_>) -> Result<Self, MappingError> {
        row.get_index(0)
    }
}

impl<T: DeserializeOwned> FromRow for Json<T> {
    fn from_row(row: &RowView<'_>) -> Result<Self, MappingError> {
        row.get_index(0)
    }
}

macro_rules! impl_from_row_tuple {
    ($(($($name:ident : $idx:tt),+)),* $(,)?) => {
        $(
            impl<$($name: FromValue),+> FromRow for ($($name,)+) {
                fn from_row(row: &RowView<'_>) -> Result<Self, MappingError> {
                    Ok(($(row.get_index::<$name>($idx)?,)+))
                }
            }
        )*
    };
}

impl_from_row_tuple!(
    (A: 0, B: 1),
    (A: 0, B: 1, C: 2),
    (A: 0, B: 1, C: 2, D: 3),
);

/// `Record` can be used as a destination to keep rows untyped.
impl FromRow for Record {
    fn from_row(row: &RowView<'_>) -> Result<Self, MappingError> {
        Ok(row.record().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_record() -> Record {
        Record::new([
            ("id", Value::Int(7)),
            ("user_name", Value::from("leo")),
            ("email", Value::Null),
        ])
    }

    #[test]
    fn test_identity_mapper_reads_field_names_verbatim() {
        let record = user_record();
        let mapper = NameMapper::default();
        let row = RowView::new(&record, &mapper);

        assert_eq!(row.get::<i64>("id").unwrap(), 7);
        assert_eq!(row.get::<String>("user_name").unwrap(), "leo");
        assert_eq!(row.get::<Option<String>>("email").unwrap(), None);
    }

    #[test]
    fn test_snake_case_mapper_translates_field_names() {
        let record = user_record();
        let mapper = NameMapper::snake_case();
        let row = RowView::new(&record, &mapper);

        assert_eq!(row.get::<String>("UserName").unwrap(), "leo");
        // get_column bypasses the mapper
        assert!(matches!(
            row.get_column::<String>("UserName"),
            Err(MappingError::MissingColumn(c)) if c == "UserName"
        ));
    }

    #[test]
    fn test_lowercase_mapper() {
        let mapper = NameMapper::lowercase();
        assert_eq!(mapper.map("ID"), "id");
        assert_eq!(NameMapper::identity().map("ID"), "ID");
    }

    #[test]
    fn test_decode_errors_name_the_column() {
        let record = user_record();
        let mapper = NameMapper::default();
        let row = RowView::new(&record, &mapper);

        let err = row.get::<i64>("user_name").unwrap_err();
        assert_eq!(
            err,
            MappingError::decode("user_name", "cannot convert text to i64")
        );

        let err = row.get::<String>("email").unwrap_err();
        assert!(err.to_string().contains("NULL"));
    }

    #[test]
    fn test_int_range_is_checked() {
        assert!(i16::from_value(&Value::Int(i64::from(i16::MAX) + 1)).is_err());
        assert_eq!(i32::from_value(&Value::Int(42)).unwrap(), 42);
        assert_eq!(f64::from_value(&Value::Int(2)).unwrap(), 2.0);
    }

    #[test]
    fn test_scalar_and_tuple_rows() {
        let record = user_record();
        let mapper = NameMapper::default();
        let row = RowView::new(&record, &mapper);

        assert_eq!(i64::from_row(&row).unwrap(), 7);
        let (id, name): (i64, String) = FromRow::from_row(&row).unwrap();
        assert_eq!((id, name.as_str()), (7, "leo"));

        let empty = Record::default();
        let row = RowView::new(&empty, &mapper);
        assert_eq!(
            i64::from_row(&row).unwrap_err(),
            MappingError::IndexOutOfRange { index: 0, len: 0 }
        );
    }

    #[test]
    fn test_unsupported_column_fails_only_when_read() {
        let record = Record::new([
            ("id", Value::Int(1)),
            (
                "tags",
                Value::Unsupported {
                    type_name: "_int4".to_string(),
                },
            ),
        ]);
        let mapper = NameMapper::default();
        let row = RowView::new(&record, &mapper);

        assert_eq!(i64::from_row(&row).unwrap(), 1);
        assert_eq!(
            row.get::<String>("tags").unwrap_err(),
            MappingError::decode("tags", "cannot convert _int4 to String")
        );
    }

    #[test]
    fn test_numeric_and_time_values() {
        let price = Decimal::new(250, 2);
        assert_eq!(Decimal::from_value(&Value::Decimal(price)).unwrap(), price);
        assert_eq!(f64::from_value(&Value::Decimal(price)).unwrap(), 2.5);
        assert_eq!(String::from_value(&Value::Decimal(price)).unwrap(), "2.50");

        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert_eq!(NaiveTime::from_value(&Value::from(noon)).unwrap(), noon);
    }

    #[test]
    fn test_with_columns_checks_lengths() {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        assert!(Record::with_columns(Arc::clone(&columns), vec![Value::Int(1)]).is_none());

        let record =
            Record::with_columns(columns, vec![Value::Int(1), Value::from("ann")]).unwrap();
        assert_eq!(record.value("name"), Some(&Value::from("ann")));
    }

    #[test]
    fn test_json_values_deserialize() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Prefs {
            theme: String,
        }

        let value = Value::Json(serde_json::json!({ "theme": "dark" }));
        let Json(prefs) = Json::<Prefs>::from_value(&value).unwrap();
        assert_eq!(prefs.theme, "dark");
    }
}
