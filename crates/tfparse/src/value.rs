//! evaluated value representation
//!
//! The evaluator hands us values of the following types
//! - null
//! - unknown (the evaluator could not determine the value, e.g. it depends on apply-time data)
//! - boolean (true/false)
//! - number (f64)
//! - string (utf-8)
//! - list (sequence of values)
//! - map (order-preserving, keys are strings)
//!
//! [normalize] turns them into [serde_json::Value]. Unknown becomes `null`; whole numbers are
//! emitted as json integers, everything else as floats.
use serde_json::Number as JsonNumber;

/// All possible evaluated value types
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluatedValue {
    Null,
    Unknown,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<EvaluatedValue>),
    Map(indexmap::IndexMap<String, EvaluatedValue>),
}

impl EvaluatedValue {
    pub fn is_unknown(&self) -> bool {
        matches!(self, EvaluatedValue::Unknown)
    }

    /// Convert back into an hcl value
    ///
    /// Returns `None` if the value is (or contains) an unknown.
    pub fn to_hcl(&self) -> Option<hcl::Value> {
        Some(match self {
            EvaluatedValue::Null => hcl::Value::Null,
            EvaluatedValue::Unknown => return None,
            EvaluatedValue::Bool(b) => hcl::Value::Bool(*b),
            EvaluatedValue::Number(n) => hcl::Value::Number(number_to_hcl(*n)?),
            EvaluatedValue::String(s) => hcl::Value::String(s.clone()),
            EvaluatedValue::List(items) => hcl::Value::Array(
                items
                    .iter()
                    .map(EvaluatedValue::to_hcl)
                    .collect::<Option<Vec<_>>>()?,
            ),
            EvaluatedValue::Map(entries) => hcl::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| v.to_hcl().map(|v| (k.clone(), v)))
                    .collect::<Option<hcl::value::Map<_, _>>>()?,
            ),
        })
    }

    /// Like [EvaluatedValue::to_hcl] but unknowns are replaced with `null`
    pub fn to_hcl_lossy(&self) -> hcl::Value {
        match self {
            EvaluatedValue::Null | EvaluatedValue::Unknown => hcl::Value::Null,
            EvaluatedValue::List(items) => {
                hcl::Value::Array(items.iter().map(EvaluatedValue::to_hcl_lossy).collect())
            }
            EvaluatedValue::Map(entries) => hcl::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_hcl_lossy()))
                    .collect(),
            ),
            known => known.to_hcl().unwrap_or(hcl::Value::Null),
        }
    }
}

fn number_to_hcl(n: f64) -> Option<hcl::Number> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        return Some(hcl::Number::from(n as i64));
    }
    hcl::Number::from_f64(n)
}

impl From<String> for EvaluatedValue {
    fn from(value: String) -> Self {
        EvaluatedValue::String(value)
    }
}

impl From<&str> for EvaluatedValue {
    fn from(value: &str) -> Self {
        EvaluatedValue::String(value.to_string())
    }
}

impl From<bool> for EvaluatedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<hcl::Number> for EvaluatedValue {
    fn from(value: hcl::Number) -> Self {
        match value.as_f64() {
            Some(float) => EvaluatedValue::Number(float),
            // unreachable for finite hcl numbers
            None => EvaluatedValue::Unknown,
        }
    }
}

impl<T: Into<EvaluatedValue>> From<Vec<T>> for EvaluatedValue {
    fn from(value: Vec<T>) -> Self {
        EvaluatedValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<EvaluatedValue>> From<hcl::value::Map<K, V>> for EvaluatedValue {
    fn from(value: hcl::value::Map<K, V>) -> Self {
        EvaluatedValue::Map(
            value
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl From<hcl::Value> for EvaluatedValue {
    fn from(value: hcl::Value) -> EvaluatedValue {
        match value {
            hcl::Value::Null => EvaluatedValue::Null,
            hcl::Value::Bool(b) => b.into(),
            hcl::Value::Number(n) => n.into(),
            hcl::Value::String(s) => s.into(),
            hcl::Value::Array(a) => a.into(),
            hcl::Value::Object(o) => o.into(),
        }
    }
}

/// Convert an evaluated value into json
///
/// Returns `None` when the value has no json representation (non-finite numbers); the caller
/// has to fall back to a textual rendering.
pub fn normalize(value: &EvaluatedValue) -> Option<serde_json::Value> {
    use serde_json::Value as Json;

    Some(match value {
        EvaluatedValue::Null | EvaluatedValue::Unknown => Json::Null,
        EvaluatedValue::String(s) => Json::String(s.clone()),
        EvaluatedValue::Bool(b) => Json::Bool(*b),
        EvaluatedValue::Number(n) => Json::Number(normalize_number(*n)?),
        EvaluatedValue::List(items) => {
            Json::Array(items.iter().map(normalize).collect::<Option<Vec<_>>>()?)
        }
        EvaluatedValue::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| normalize(v).map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()?,
        ),
    })
}

fn normalize_number(n: f64) -> Option<JsonNumber> {
    if !n.is_finite() {
        return None;
    }

    if n.fract() == 0.0 {
        if n >= i64::MIN as f64 && n < i64::MAX as f64 {
            return Some(JsonNumber::from(n as i64));
        }
        if n >= 0.0 && n < u64::MAX as f64 {
            return Some(JsonNumber::from(n as u64));
        }
    }

    JsonNumber::from_f64(n)
}
