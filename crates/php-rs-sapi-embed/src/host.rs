//! Host-side shape of runtime values.

use indexmap::IndexMap;
use php_rs_vm::{ArrayKey, PhpArray, Value as Zval};
use serde::de::value::{Error as DecodeError, MapDeserializer, SeqDeserializer};
use serde::de::{DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// The natural host representation of a runtime value.
///
/// This is what receiver constructors and methods are handed, and what
/// [`Value::interface`](crate::Value::interface) returns. Arrays with keys
/// `0..n-1` become [`HostValue::Slice`]; every other array, and every
/// object, becomes a string-keyed [`HostValue::Map`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Null,
    Long(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Slice(Vec<HostValue>),
    Map(IndexMap<String, HostValue>),
}

impl HostValue {
    /// Natural conversion of a runtime value.
    pub fn from_zval(zval: &Zval) -> HostValue {
        match zval {
            Zval::Null => HostValue::Null,
            Zval::Bool(b) => HostValue::Bool(*b),
            Zval::Long(n) => HostValue::Long(*n),
            Zval::Double(f) => HostValue::Double(*f),
            Zval::String(s) => HostValue::String(s.clone()),
            Zval::Array(arr) if arr.is_list() => {
                HostValue::Slice(arr.values().map(HostValue::from_zval).collect())
            }
            Zval::Array(arr) => HostValue::Map(map_entries(arr)),
            Zval::Object(obj) => HostValue::Map(
                obj.borrow()
                    .properties
                    .iter()
                    .map(|(name, value)| (name.clone(), HostValue::from_zval(value)))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Double(f) => Some(*f),
            HostValue::Long(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Slice(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, HostValue>> {
        match self {
            HostValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Decode into a typed host value. Fails when the shapes disagree, so
    /// a string never decodes as an integer and a map never as a list.
    ///
    /// ```no_run
    /// use php_rs_sapi_embed::HostValue;
    ///
    /// let pair: (i32, String) = HostValue::from(vec![
    ///     HostValue::Long(1),
    ///     HostValue::from("a"),
    /// ]).decode().unwrap();
    /// assert_eq!(pair, (1, "a".to_string()));
    /// ```
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        T::deserialize(self.clone())
    }
}

impl<'de> Deserializer<'de> for HostValue {
    type Error = DecodeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self {
            HostValue::Null => visitor.visit_unit(),
            HostValue::Long(n) => visitor.visit_i64(n),
            HostValue::Double(f) => visitor.visit_f64(f),
            HostValue::Bool(b) => visitor.visit_bool(b),
            HostValue::String(s) => visitor.visit_string(s),
            HostValue::Slice(items) => visitor.visit_seq(SeqDeserializer::new(items.into_iter())),
            HostValue::Map(entries) => visitor.visit_map(MapDeserializer::new(entries.into_iter())),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self {
            HostValue::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

impl<'de> IntoDeserializer<'de, DecodeError> for HostValue {
    type Deserializer = HostValue;

    fn into_deserializer(self) -> HostValue {
        self
    }
}

/// Array entries with keys rendered as decimal strings.
pub(crate) fn map_entries(arr: &PhpArray) -> IndexMap<String, HostValue> {
    arr.iter()
        .map(|(key, value)| {
            let key = match key {
                ArrayKey::Int(n) => n.to_string(),
                ArrayKey::String(s) => s.clone(),
            };
            (key, HostValue::from_zval(value))
        })
        .collect()
}

impl Serialize for HostValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HostValue::Null => serializer.serialize_unit(),
            HostValue::Long(n) => serializer.serialize_i64(*n),
            HostValue::Double(f) => serializer.serialize_f64(*f),
            HostValue::Bool(b) => serializer.serialize_bool(*b),
            HostValue::String(s) => serializer.serialize_str(s),
            HostValue::Slice(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            HostValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Long(n)
    }
}

impl From<f64> for HostValue {
    fn from(f: f64) -> Self {
        HostValue::Double(f)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::Slice(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use php_rs_vm::{ObjectRef, PhpObject};

    #[test]
    fn test_natural_conversion_of_arrays() {
        let list: PhpArray = [Zval::Long(1), Zval::string("a")].into_iter().collect();
        assert_eq!(
            HostValue::from_zval(&Zval::Array(list)),
            HostValue::Slice(vec![HostValue::Long(1), HostValue::from("a")])
        );

        let mut map = PhpArray::new();
        map.insert(ArrayKey::Int(3), Zval::Bool(true));
        map.insert(ArrayKey::from_string("k"), Zval::Null);
        let HostValue::Map(entries) = HostValue::from_zval(&Zval::Array(map)) else {
            panic!("expected a map");
        };
        assert_eq!(entries.keys().collect::<Vec<_>>(), ["3", "k"]);
        assert_eq!(entries["3"], HostValue::Bool(true));
    }

    #[test]
    fn test_natural_conversion_of_objects() {
        let mut object = PhpObject::new("stdClass");
        object.set_property("A", Zval::Double(1.5));
        let value = HostValue::from_zval(&Zval::Object(ObjectRef::new(object)));
        assert_eq!(value.as_map().map(|m| m["A"].clone()), Some(HostValue::Double(1.5)));
    }

    #[test]
    fn test_decode_matching_shapes() {
        assert_eq!(HostValue::Long(7).decode::<u8>().unwrap(), 7);
        assert_eq!(HostValue::Long(2).decode::<f64>().unwrap(), 2.0);
        assert_eq!(HostValue::Null.decode::<Option<i64>>().unwrap(), None);
        assert_eq!(
            HostValue::from(vec!["a", "b"]).decode::<Vec<String>>().unwrap(),
            ["a", "b"]
        );

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Point {
            x: i64,
            y: i64,
        }
        let map = HostValue::Map(IndexMap::from([
            ("x".to_string(), HostValue::Long(1)),
            ("y".to_string(), HostValue::Long(2)),
        ]));
        assert_eq!(map.decode::<Point>().unwrap(), Point { x: 1, y: 2 });
    }

    #[test]
    fn test_decode_rejects_mismatched_shapes() {
        assert!(HostValue::from("12").decode::<i64>().is_err());
        assert!(HostValue::Long(300).decode::<u8>().is_err());
        assert!(HostValue::Bool(true).decode::<String>().is_err());
        assert!(HostValue::Null.decode::<bool>().is_err());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(HostValue::Long(2).as_f64(), Some(2.0));
        assert_eq!(HostValue::from("x").as_i64(), None);
        assert_eq!(HostValue::from(vec!["a", "b"]).as_slice().map(<[_]>::len), Some(2));
        assert!(HostValue::default().is_null());
    }
}
