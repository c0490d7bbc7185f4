//! Owned rows and scalar values.
//!
//! Rows are copied out of SQLite as soon as they are read, so a [`Row`] never
//! borrows from a connection or statement and can be kept around after the
//! stream that produced it has moved on.

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, Column, Row as _, TypeInfo, ValueRef};
use std::fmt::{Display, Formatter};

/// A single scalar value, as stored by SQLite.
///
/// Also used for positional query parameters; the `From` implementations
/// exist so call sites can write `&[account.into(), 34.into()]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}
impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Conversion out of a borrowed [`Value`].
///
/// Returns `None` when the stored type doesn't fit; [`Row::get`] turns that
/// into [`ErrorKind::InvalidData`] naming the column.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}
impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }
}
impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Real(v) => Some(*v),
            // SQLite happily stores whole numbers in REAL columns as integers.
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}
impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}
impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Blob(v) => Some(v.clone()),
            _ => None,
        }
    }
}
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// A fully materialized result row: column names plus owned values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}
impl Row {
    /// `columns` and `values` are matched up by position.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names, in select order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of values in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Borrow the raw value of a column, if the column exists.
    pub fn get_raw(&self, column: &str) -> Option<&Value> {
        self.position(column).and_then(|i| self.values.get(i))
    }

    /// Get a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        self.get_raw(column)
            .and_then(T::from_value)
            .ok_or_raise(|| ErrorKind::InvalidData(column.to_string()))
    }

    /// Move a value out of the row, leaving [`Value::Null`] in its place.
    ///
    /// Media payloads can be several hundred kilobytes; this avoids cloning
    /// them just to hand them to the transcoder.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        let i = self.position(column)?;
        self.values.get_mut(i).map(std::mem::take)
    }

    /// The first column's value, used for scalar (count) queries.
    pub(crate) fn first(&self) -> Option<&Value> {
        self.values.first()
    }
}
impl TryFrom<&SqliteRow> for Row {
    type Error = sqlx::Error;
    fn try_from(row: &SqliteRow) -> std::result::Result<Self, Self::Error> {
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for column in row.columns() {
            let i = column.ordinal();
            let raw = row.try_get_raw(i)?;
            // The type info of a value (as opposed to a column) is the storage
            // class SQLite actually used for this cell, not the declared type.
            let value = if raw.is_null() {
                Value::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" => Value::Integer(row.try_get_unchecked(i)?),
                    "REAL" => Value::Real(row.try_get_unchecked(i)?),
                    "BLOB" => Value::Blob(row.try_get_unchecked(i)?),
                    _ => Value::Text(row.try_get_unchecked(i)?),
                }
            };
            columns.push(column.name().to_string());
            values.push(value);
        }
        Ok(Self { columns, values })
    }
}

/// Bind positional parameters. Arguments are consumed by each execution, so
/// this is called once per shard with the same borrowed parameter slice.
pub(crate) fn arguments(params: &[Value]) -> std::result::Result<SqliteArguments<'_>, BoxDynError> {
    let mut args = SqliteArguments::default();
    for param in params {
        match param {
            Value::Null => args.add(None::<i64>)?,
            Value::Integer(v) => args.add(*v)?,
            Value::Real(v) => args.add(*v)?,
            Value::Text(v) => args.add(v.as_str())?,
            Value::Blob(v) => args.add(v.as_slice())?,
        }
    }
    Ok(args)
}
