// Job / Event Payload
//
// JSON-compatible structure plus two extended primitives. On the wire the
// extended values travel as single-key surrogate objects:
//   Timestamp -> {"$date": "2024-05-01T12:00:00.123456Z"}
//   ObjectId  -> {"$oid": "65f1c0ffee0ddba11deadbee"}

use crate::error::{AppError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

const DATE_KEY: &str = "$date";
const OID_KEY: &str = "$oid";

/// 12-byte opaque identifier (document-store object id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parse the 24-character hex form
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| AppError::MalformedPayload(format!("invalid object id '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Structured payload carried by queues and topics
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
    Timestamp(DateTime<Utc>),
    ObjectId(ObjectId),
}

impl Payload {
    /// Build an object from key/value pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Payload>,
        I: IntoIterator<Item = (K, V)>,
    {
        Payload::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Field lookup on objects; `None` for every other variant
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Payload::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Payload::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    /// Convert to a JSON tree, extended values as surrogate objects
    ///
    /// # Errors
    /// - `AppError::MalformedPayload` for NaN or infinite floats
    /// - `AppError::MalformedPayload` for an object whose only key is `$date` or `$oid`
    pub fn to_json(&self) -> Result<Value> {
        Ok(match self {
            Payload::Null => Value::Null,
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Int(n) => Value::Number((*n).into()),
            Payload::Float(f) => Value::Number(Number::from_f64(*f).ok_or_else(|| {
                AppError::MalformedPayload(format!("non-finite float {} cannot be encoded", f))
            })?),
            Payload::String(s) => Value::String(s.clone()),
            Payload::Array(items) => Value::Array(
                items
                    .iter()
                    .map(Payload::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Payload::Object(map) => {
                if let Some(key) = reserved_key(map) {
                    return Err(AppError::MalformedPayload(format!(
                        "object with the single key '{}' would decode as an extended value",
                        key
                    )));
                }
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                Value::Object(out)
            }
            Payload::Timestamp(t) => surrogate(
                DATE_KEY,
                Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            ),
            Payload::ObjectId(oid) => surrogate(OID_KEY, Value::String(oid.to_hex())),
        })
    }

    /// Rebuild a payload from a JSON tree, restoring surrogate objects
    ///
    /// # Errors
    /// - `AppError::MalformedPayload` if a `$date`/`$oid` surrogate holds an unparsable value
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => number(&n),
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::Array(
                items
                    .into_iter()
                    .map(Payload::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(date) = map.get(DATE_KEY) {
                        return parse_date(date).map(Payload::Timestamp);
                    }
                    if let Some(oid) = map.get(OID_KEY) {
                        let hex = oid.as_str().ok_or_else(|| {
                            AppError::MalformedPayload(format!("$oid must be a string, got {}", oid))
                        })?;
                        return ObjectId::parse_str(hex).map(Payload::ObjectId);
                    }
                }
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(k, Payload::from_json(v)?);
                }
                Payload::Object(out)
            }
        })
    }
}

impl Payload {
    /// Build a payload from any serializable value
    ///
    /// Surrogate objects in the serialized form become extended values.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Payload::from_json(serde_json::to_value(value)?)
    }

    /// Deserialize into a typed struct; extended values are seen as their surrogates
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()?)
            .map_err(|e| AppError::MalformedPayload(format!("unexpected payload shape: {}", e)))
    }
}

/// The surrogate key of a single-key object that would not survive a round trip
fn reserved_key(map: &BTreeMap<String, Payload>) -> Option<&str> {
    if map.len() != 1 {
        return None;
    }
    map.keys()
        .map(String::as_str)
        .find(|k| *k == DATE_KEY || *k == OID_KEY)
}

fn surrogate(key: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn number(n: &Number) -> Payload {
    if let Some(i) = n.as_i64() {
        Payload::Int(i)
    } else {
        // u64 above i64::MAX or a true float
        Payload::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn parse_date(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AppError::MalformedPayload(format!("invalid $date '{}': {}", s, e))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| AppError::MalformedPayload(format!("invalid $date millis {}", n))),
        other => Err(AppError::MalformedPayload(format!(
            "$date must be a string or epoch millis, got {}",
            other
        ))),
    }
}

/// Encode a payload as UTF-8 JSON text
pub fn encode(payload: &Payload) -> Result<String> {
    Ok(serde_json::to_string(&payload.to_json()?)?)
}

/// Decode UTF-8 JSON text produced by [`encode`] (or any compatible writer)
pub fn decode(text: &str) -> Result<Payload> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| AppError::MalformedPayload(format!("invalid JSON: {}", e)))?;
    Payload::from_json(value)
}

/// Structural conversion: surrogate objects are NOT interpreted here.
/// Use [`Payload::from_json`] for that.
impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => number(&n),
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::Array(items.into_iter().map(Payload::from).collect()),
            Value::Object(map) => {
                Payload::Object(map.into_iter().map(|(k, v)| (k, Payload::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::String(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::String(s)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Int(n)
    }
}

impl From<i32> for Payload {
    fn from(n: i32) -> Self {
        Payload::Int(n.into())
    }
}

impl From<f64> for Payload {
    fn from(f: f64) -> Self {
        Payload::Float(f)
    }
}

impl From<DateTime<Utc>> for Payload {
    fn from(t: DateTime<Utc>) -> Self {
        Payload::Timestamp(t)
    }
}

impl From<ObjectId> for Payload {
    fn from(oid: ObjectId) -> Self {
        Payload::ObjectId(oid)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(items: Vec<Payload>) -> Self {
        Payload::Array(items)
    }
}

impl From<BTreeMap<String, Payload>> for Payload {
    fn from(map: BTreeMap<String, Payload>) -> Self {
        Payload::Object(map)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::Null, Into::into)
    }
}
