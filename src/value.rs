//! Normalized value model used for all stub/input comparisons.
//!
//! Heterogeneous host values are canonicalized into a small closed set:
//! every integer width becomes `Int`, every float width `Float`, byte
//! sequences become `Text`, `Option` wrapping collapses to the inner value
//! or `Null`, and timestamps become `Time`. Anything outside the accepted
//! set simply has no `From` impl, so unsupported test-setup input is a
//! compile error rather than a runtime surprise.
use crate::*;
use chrono::{DateTime, NaiveDateTime, Utc};

#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum Value {
    #[display("NULL")]
    Null,
    #[display("{_0}")]
    Bool(bool),
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Float(f64),
    #[display("{_0}")]
    Text(String),
    #[display("{_0}")]
    Time(NaiveDateTime),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(v.into())
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(v.into())
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Text(String::from_utf8_lossy(v).into_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        v.as_slice().into()
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Time(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v.naive_utc())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A derived WHERE entry: a single comparison value, or the value list of
/// an IN clause.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereValue {
    One(Value),
    Many(Vec<Value>),
}

/// Equivalence between an observed (query-side) and an expected
/// (stub-side) value.
///
/// Two carve-outs soften strict structural equality:
/// - with a time layout configured, an expected `Time` compares as
///   formatted text, so an in-memory timestamp matches the string form a
///   driver would carry;
/// - an expected `Bool` matches integer 0/1 and the strings
///   "true"/"false"/"0"/"1", since drivers disagree on boolean encoding.
pub(crate) fn equals(observed: &Value, expected: &Value, time_layout: Option<&str>) -> bool {
    match (observed, expected) {
        (_, Value::Time(want)) => {
            let Some(layout) = time_layout else {
                return observed == expected;
            };
            let got = match observed {
                Value::Time(t) => *t,
                Value::Text(s) => match NaiveDateTime::parse_from_str(s, layout) {
                    Ok(t) => t,
                    Err(_) => return observed == expected,
                },
                _ => return observed == expected,
            };
            got.format(layout).to_string() == want.format(layout).to_string()
        }
        (Value::Bool(got), Value::Bool(want)) => got == want,
        (Value::Int(got), Value::Bool(want)) => *want == (*got != 0),
        (Value::Text(got), Value::Bool(want)) => match text_to_bool(got) {
            Some(b) => b == *want,
            None => {
                debug!("unknown boolean text: {got}");
                false
            }
        },
        _ => observed == expected,
    }
}

fn text_to_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
