use crate::error::SerializationError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Domain object that knows how to present itself in a log line.
///
/// Returning `None` means the object has no safe JSON form; the whole
/// format call then fails with a [`SerializationError`].
pub trait ToLogJson: fmt::Debug + Send + Sync {
    fn to_log_json(&self) -> Option<Value>;
}

/// Value carried by log arguments, extra attributes, request metadata and
/// raw traceback data before it is coerced to JSON.
#[derive(Debug, Clone)]
pub enum LogValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    List(Vec<LogValue>),
    Map(BTreeMap<String, LogValue>),
    Object(Arc<dyn ToLogJson>),
}

impl LogValue {
    pub fn is_null(&self) -> bool {
        matches!(self, LogValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LogValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, LogValue>> {
        match self {
            LogValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Coerce into a JSON value. `path` names this value in error reports.
    pub fn to_json(&self, path: &str) -> Result<Value, SerializationError> {
        Ok(match self {
            LogValue::Null => Value::Null,
            LogValue::Bool(b) => Value::Bool(*b),
            LogValue::Int(i) => Value::from(*i),
            LogValue::UInt(u) => Value::from(*u),
            LogValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| SerializationError::new(path, format!("non-finite float {}", f)))?,
            LogValue::Str(s) => Value::String(s.clone()),
            LogValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Value::String(text.to_string()),
                Err(e) => return Err(SerializationError::new(path, format!("bytes are not UTF-8: {}", e))),
            },
            LogValue::DateTime(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            LogValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            LogValue::List(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.to_json(&format!("{}[{}]", path, i)))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            LogValue::Map(map) => Value::Object(map_to_json(map, Some(path))?),
            LogValue::Object(obj) => obj.to_log_json().ok_or_else(|| {
                SerializationError::new(path, format!("object {:?} has no JSON representation", obj))
            })?,
        })
    }

    /// Text used when the value is substituted into a message template:
    /// strings as-is, anything else as its JSON text.
    pub fn render(&self, path: &str) -> Result<String, SerializationError> {
        match self {
            LogValue::Str(s) => Ok(s.clone()),
            other => Ok(other.to_json(path)?.to_string()),
        }
    }
}

fn map_to_json(
    map: &BTreeMap<String, LogValue>,
    prefix: Option<&str>,
) -> Result<Map<String, Value>, SerializationError> {
    let mut out = Map::new();
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        out.insert(key.clone(), value.to_json(&path)?);
    }
    Ok(out)
}

/// Serialize a flat record to a JSON byte string.
///
/// Either every value is rendered or nothing is returned.
pub fn encode_record(record: &BTreeMap<String, LogValue>) -> Result<Vec<u8>, SerializationError> {
    let object = map_to_json(record, None)?;
    serde_json::to_vec(&Value::Object(object)).map_err(|e| SerializationError::new("$", e.to_string()))
}

impl From<&str> for LogValue {
    fn from(value: &str) -> Self {
        LogValue::Str(value.to_string())
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        LogValue::Str(value)
    }
}

impl From<bool> for LogValue {
    fn from(value: bool) -> Self {
        LogValue::Bool(value)
    }
}

impl From<i32> for LogValue {
    fn from(value: i32) -> Self {
        LogValue::Int(value.into())
    }
}

impl From<i64> for LogValue {
    fn from(value: i64) -> Self {
        LogValue::Int(value)
    }
}

impl From<u32> for LogValue {
    fn from(value: u32) -> Self {
        LogValue::UInt(value.into())
    }
}

impl From<u64> for LogValue {
    fn from(value: u64) -> Self {
        LogValue::UInt(value)
    }
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        LogValue::Float(value)
    }
}

impl From<Vec<u8>> for LogValue {
    fn from(value: Vec<u8>) -> Self {
        LogValue::Bytes(value)
    }
}

impl From<DateTime<Utc>> for LogValue {
    fn from(value: DateTime<Utc>) -> Self {
        LogValue::DateTime(value)
    }
}

impl From<NaiveDate> for LogValue {
    fn from(value: NaiveDate) -> Self {
        LogValue::Date(value)
    }
}

impl From<BTreeMap<String, LogValue>> for LogValue {
    fn from(value: BTreeMap<String, LogValue>) -> Self {
        LogValue::Map(value)
    }
}

impl From<Vec<LogValue>> for LogValue {
    fn from(value: Vec<LogValue>) -> Self {
        LogValue::List(value)
    }
}

impl<T: Into<LogValue>> From<Option<T>> for LogValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(LogValue::Null, Into::into)
    }
}

impl From<Value> for LogValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => LogValue::Null,
            Value::Bool(b) => LogValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    LogValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    LogValue::UInt(u)
                } else {
                    LogValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => LogValue::Str(s),
            Value::Array(items) => LogValue::List(items.into_iter().map(LogValue::from).collect()),
            Value::Object(map) => LogValue::Map(map.into_iter().map(|(k, v)| (k, LogValue::from(v))).collect()),
        }
    }
}
