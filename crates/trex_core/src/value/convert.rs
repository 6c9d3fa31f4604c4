//! Conversions between [`Value`] and Rust types.

use super::{Fields, Node, Value};
use crate::error::StoreResult;
use serde::de::DeserializeOwned;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::sync::Arc;

impl Value {
    /// Converts any serializable value into a state value.
    ///
    /// Structs and maps become [`Node`]s, sequences become lists.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> StoreResult<Value> {
        Ok(Value::from(serde_json::to_value(value)?))
    }

    /// Deserializes this value into a typed Rust value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    /// Converts this value into a JSON value.
    ///
    /// Non-finite floats become JSON null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(node) => serde_json::Value::Object(
                node.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Text(s.into()),
            serde_json::Value::Array(items) => {
                Value::List(Arc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Map(map.into_iter().collect()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(node) => node.serialize(serializer),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Map(node)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Map(Node::new(fields))
    }
}

/// Builds a [`Fields`](crate::Fields) map.
///
/// ```
/// use trex_core::{fields, Value};
///
/// let fields = fields! { "name" => "Ada", "age" => 36 };
/// assert_eq!(fields["age"], Value::from(36));
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::Fields::new();
        $(
            fields.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        fields
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Contact {
        name: String,
        tags: Vec<String>,
        score: f64,
    }

    #[test]
    fn typed_bridge() {
        let contact = Contact {
            name: "Ada".into(),
            tags: vec!["math".into()],
            score: 1.5,
        };
        let value = Value::from_serialize(&contact).unwrap();
        let node = value.as_node().unwrap();
        assert_eq!(node.get("name"), Some(&Value::from("Ada")));
        assert_eq!(node.get("score"), Some(&Value::from(1.5)));

        let back: Contact = value.deserialize().unwrap();
        assert_eq!(back, contact);
    }

    #[test]
    fn deserialize_reports_shape_errors() {
        let value = Value::from(fields! { "name" => 3 });
        let err = value.deserialize::<Contact>().unwrap_err();
        assert!(matches!(err, crate::StoreError::Serialization(_)));
    }

    #[test]
    fn json_integers_stay_integers() {
        let value = Value::from(serde_json::json!({ "n": 3, "x": 0.5 }));
        let node = value.as_node().unwrap();
        assert_eq!(node.get("n"), Some(&Value::Integer(3)));
        assert_eq!(node.get("x"), Some(&Value::Float(0.5)));
    }

    #[test]
    fn serializes_as_plain_json() {
        let value = Value::from(fields! {
            "items" => vec![1, 2],
            "nested" => fields! { "ok" => true },
            "none" => Option::<i64>::None,
        });
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"items":[1,2],"nested":{"ok":true},"none":null}"#);
    }

    #[test]
    fn non_finite_float_becomes_null() {
        assert_eq!(Value::from(f64::NAN).to_json(), serde_json::Value::Null);
    }
}
