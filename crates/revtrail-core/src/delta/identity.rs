//! Array element identity and value equality.
//!
//! Array diffing matches elements by identity rather than position. The
//! identity of an object element comes from an [`ElementIdentity`]
//! implementation; scalars are identified by their value. Elements without a
//! stable id fall back to their index at diff time, which makes diffs of such
//! arrays order-sensitive.

use serde_json::Value;

/// Extension point: how array elements are recognised across versions
///
/// Return `None` to fall back to positional identity.
pub trait ElementIdentity: Send + Sync {
    fn key(&self, element: &Value, index: usize) -> Option<String>;
}

impl<F> ElementIdentity for F
where
    F: Fn(&Value, usize) -> Option<String> + Send + Sync,
{
    fn key(&self, element: &Value, index: usize) -> Option<String> {
        self(element, index)
    }
}

/// Default identity: `_id`, then `id`, else positional
#[derive(Debug, Clone, Copy, Default)]
pub struct IdOrIndex;

impl ElementIdentity for IdOrIndex {
    fn key(&self, element: &Value, _index: usize) -> Option<String> {
        let map = element.as_object()?;
        ["_id", "id"]
            .iter()
            .filter_map(|field| map.get(*field))
            .find(|id| !matches!(id, Value::Null) && id.as_str() != Some(""))
            .map(scalar_key)
    }
}

/// Matching key for an element at `index`
pub(crate) fn element_key(identity: &dyn ElementIdentity, element: &Value, index: usize) -> String {
    match element {
        Value::Object(_) => match identity.key(element, index) {
            Some(key) => format!("id:{}", key),
            None => format!("pos:{}", index),
        },
        Value::Array(_) => format!("pos:{}", index),
        scalar => format!("val:{}", scalar_key(scalar)),
    }
}

fn scalar_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

/// Deep equality with numeric comparison (`1 == 1.0`)
///
/// Different JSON types are never equal, so `"1"` and `1` differ.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) if x.is_f64() || y.is_f64() => fx == fy,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}
