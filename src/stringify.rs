//! Default value serialization
//!
//! Read defaults travel to the server as a single string. Primitives become
//! their literal text, byte arrays base64, timestamps ISO-8601, and lists or
//! objects JSON. Values the loader could not represent are rejected rather
//! than degraded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};

/// A host value supplied as a field or migration read default
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<DefaultValue>),
    Object(IndexMap<String, DefaultValue>),
    /// Something the loader saw but cannot serialize, e.g. a function
    Opaque { type_name: String },
}

impl DefaultValue {
    /// Build from a JSON value, as found in declarative documents
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

macro_rules! default_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for DefaultValue {
                fn from(v: $t) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

default_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => UInt,
    u64 => UInt,
    f64 => Float,
    String => String,
    Vec<u8> => Bytes,
    DateTime<Utc> => Timestamp,
}

impl From<&str> for DefaultValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Stringify a read default. `None` and `Null` mean "no default".
pub fn stringify_default(value: Option<&DefaultValue>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    match stringify_inner(value)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Ok(Some(serde_json::to_string(&other)?)),
    }
}

fn stringify_inner(value: &DefaultValue) -> Result<Option<Value>> {
    let out = match value {
        DefaultValue::Null => return Ok(None),
        DefaultValue::Bool(b) => Value::String(b.to_string()),
        DefaultValue::Int(i) => Value::String(i.to_string()),
        DefaultValue::UInt(u) => Value::String(u.to_string()),
        DefaultValue::Float(f) => {
            if !f.is_finite() {
                return Err(SchemaError::UnserializableDefault(format!(
                    "non-finite number {}",
                    f
                )));
            }
            Value::String(format_float(*f))
        }
        DefaultValue::String(s) => Value::String(s.clone()),
        DefaultValue::Bytes(b) => Value::String(STANDARD.encode(b)),
        DefaultValue::Timestamp(t) => {
            Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        DefaultValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| Ok(stringify_inner(item)?.unwrap_or(Value::Null)))
                .collect::<Result<Vec<_>>>()?,
        ),
        DefaultValue::Object(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                if let Some(v) = stringify_inner(v)? {
                    map.insert(k.clone(), v);
                }
            }
            Value::Object(map)
        }
        DefaultValue::Opaque { type_name } => {
            return Err(SchemaError::UnserializableDefault(format!(
                "cannot serialize a value of type {}",
                type_name
            )));
        }
    };
    Ok(Some(out))
}

/// Number text as JavaScript prints it: exponent form outside `[1e-6, 1e21)`.
fn format_float(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    let magnitude = f.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let text = format!("{:e}", f);
        return match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => text,
        };
    }
    f.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(DefaultValue::from(42i32), "42")]
    #[case(DefaultValue::from(-7i64), "-7")]
    #[case(DefaultValue::from(true), "true")]
    #[case(DefaultValue::from(1.5), "1.5")]
    #[case(DefaultValue::from(-0.0), "0")]
    #[case(DefaultValue::from(1e20), "100000000000000000000")]
    #[case(DefaultValue::from(1e21), "1e+21")]
    #[case(DefaultValue::from(-1.25e30), "-1.25e+30")]
    #[case(DefaultValue::from(0.000001), "0.000001")]
    #[case(DefaultValue::from(1e-7), "1e-7")]
    #[case(DefaultValue::from(1.5e-7), "1.5e-7")]
    #[case(DefaultValue::from("Python Wrangler"), "Python Wrangler")]
    #[case(DefaultValue::from(vec![1u8, 2, 3]), "AQID")]
    fn test_primitives(#[case] value: DefaultValue, #[case] expected: &str) {
        assert_eq!(
            stringify_default(Some(&value)).unwrap(),
            Some(expected.to_string())
        );
    }

    #[test]
    fn test_timestamp_is_iso8601() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            stringify_default(Some(&DefaultValue::from(ts))).unwrap().as_deref(),
            Some("2024-03-01T12:30:00.000Z")
        );
    }

    #[test]
    fn test_composites_are_json() {
        let list = DefaultValue::List(vec![DefaultValue::from(1i32), DefaultValue::from("a")]);
        assert_eq!(
            stringify_default(Some(&list)).unwrap().as_deref(),
            Some(r#"["1","a"]"#)
        );

        let mut entries = IndexMap::new();
        entries.insert("b".to_string(), DefaultValue::from(2i32));
        entries.insert("a".to_string(), DefaultValue::Null);
        let obj = DefaultValue::Object(entries);
        assert_eq!(
            stringify_default(Some(&obj)).unwrap().as_deref(),
            Some(r#"{"b":"2"}"#)
        );
    }

    #[test]
    fn test_object_default_keeps_declared_order() {
        let mut entries = IndexMap::new();
        entries.insert("zeta".to_string(), DefaultValue::from(1i32));
        entries.insert("alpha".to_string(), DefaultValue::from(2i32));
        entries.insert("mid".to_string(), DefaultValue::from(vec![0xffu8]));
        let obj = DefaultValue::Object(entries);
        assert_eq!(
            stringify_default(Some(&obj)).unwrap().as_deref(),
            Some(r#"{"zeta":"1","alpha":"2","mid":"/w=="}"#)
        );
    }

    #[test]
    fn test_missing_default() {
        assert_eq!(stringify_default(None).unwrap(), None);
        assert_eq!(stringify_default(Some(&DefaultValue::Null)).unwrap(), None);
    }

    #[test]
    fn test_opaque_fails_fast() {
        let nested = DefaultValue::List(vec![DefaultValue::Opaque {
            type_name: "function".to_string(),
        }]);
        let err = stringify_default(Some(&nested)).unwrap_err();
        assert_eq!(err.code().as_str(), "SchemaUnserializableDefault");

        let nan = DefaultValue::Float(f64::NAN);
        assert!(stringify_default(Some(&nan)).is_err());
    }
}
