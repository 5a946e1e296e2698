//! Host → runtime conversion.
//!
//! Any `serde::Serialize` type can be turned into a runtime value: the
//! serializer below walks the serde data model and builds the zval
//! directly. Struct fields become public properties of a `stdClass`
//! object in declaration order; `#[serde(skip)]` fields are left out.

use php_rs_vm::{ArrayKey, ObjectRef, PhpArray, PhpObject, Value as Zval};
use serde::ser::{self, Impossible, Serialize};

use crate::error::ConversionError;

/// Convert any serializable host value into a runtime value.
pub fn to_zval<T: Serialize + ?Sized>(value: &T) -> Result<Zval, ConversionError> {
    value.serialize(ZvalSerializer)
}

fn unsupported<T>(what: impl Into<String>) -> Result<T, ConversionError> {
    Err(ConversionError::UnsupportedType(what.into()))
}

struct ZvalSerializer;

impl ser::Serializer for ZvalSerializer {
    type Ok = Zval;
    type Error = ConversionError;

    type SerializeSeq = ArrayBuilder;
    type SerializeTuple = ArrayBuilder;
    type SerializeTupleStruct = ArrayBuilder;
    type SerializeTupleVariant = Impossible<Zval, ConversionError>;
    type SerializeMap = MapBuilder;
    type SerializeStruct = ObjectBuilder;
    type SerializeStructVariant = Impossible<Zval, ConversionError>;

    fn serialize_bool(self, v: bool) -> Result<Zval, ConversionError> {
        Ok(Zval::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Zval, ConversionError> {
        Ok(Zval::Long(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Zval, ConversionError> {
        Ok(Zval::Long(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Zval, ConversionError> {
        Ok(Zval::Long(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Zval, ConversionError> {
        Ok(Zval::Long(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Zval, ConversionError> {
        match i64::try_from(v) {
            Ok(n) => Ok(Zval::Long(n)),
            Err(_) => unsupported("i128"),
        }
    }

    fn serialize_u8(self, v: u8) -> Result<Zval, ConversionError> {
        Ok(Zval::Long(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Zval, ConversionError> {
        Ok(Zval::Long(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Zval, ConversionError> {
        Ok(Zval::Long(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Zval, ConversionError> {
        match i64::try_from(v) {
            Ok(n) => Ok(Zval::Long(n)),
            Err(_) => unsupported("u64"),
        }
    }

    fn serialize_u128(self, v: u128) -> Result<Zval, ConversionError> {
        match i64::try_from(v) {
            Ok(n) => Ok(Zval::Long(n)),
            Err(_) => unsupported("u128"),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Zval, ConversionError> {
        Ok(Zval::Double(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Zval, ConversionError> {
        Ok(Zval::Double(v))
    }

    fn serialize_char(self, v: char) -> Result<Zval, ConversionError> {
        Ok(Zval::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Zval, ConversionError> {
        Ok(Zval::string(v))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Zval, ConversionError> {
        unsupported("bytes")
    }

    fn serialize_none(self) -> Result<Zval, ConversionError> {
        Ok(Zval::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Zval, ConversionError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Zval, ConversionError> {
        Ok(Zval::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Zval, ConversionError> {
        Ok(Zval::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Zval, ConversionError> {
        Ok(Zval::string(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Zval, ConversionError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        _value: &T,
    ) -> Result<Zval, ConversionError> {
        unsupported(format!("{}::{}", name, variant))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<ArrayBuilder, ConversionError> {
        Ok(ArrayBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<ArrayBuilder, ConversionError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<ArrayBuilder, ConversionError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, ConversionError> {
        unsupported(format!("{}::{}", name, variant))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, ConversionError> {
        Ok(MapBuilder {
            array: PhpArray::new(),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<ObjectBuilder, ConversionError> {
        Ok(ObjectBuilder {
            object: PhpObject::new("stdClass"),
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, ConversionError> {
        unsupported(format!("{}::{}", name, variant))
    }
}

/// Sequences and tuples: a packed array.
struct ArrayBuilder {
    items: Vec<Zval>,
}

impl ArrayBuilder {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConversionError> {
        self.items.push(to_zval(value)?);
        Ok(())
    }

    fn finish(self) -> Result<Zval, ConversionError> {
        Ok(Zval::Array(self.items.into_iter().collect()))
    }
}

impl ser::SerializeSeq for ArrayBuilder {
    type Ok = Zval;
    type Error = ConversionError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConversionError> {
        self.push(value)
    }

    fn end(self) -> Result<Zval, ConversionError> {
        self.finish()
    }
}

impl ser::SerializeTuple for ArrayBuilder {
    type Ok = Zval;
    type Error = ConversionError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConversionError> {
        self.push(value)
    }

    fn end(self) -> Result<Zval, ConversionError> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for ArrayBuilder {
    type Ok = Zval;
    type Error = ConversionError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConversionError> {
        self.push(value)
    }

    fn end(self) -> Result<Zval, ConversionError> {
        self.finish()
    }
}

/// Maps: an associative array. Keys must be integers or strings.
struct MapBuilder {
    array: PhpArray,
    key: Option<ArrayKey>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Zval;
    type Error = ConversionError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), ConversionError> {
        self.key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConversionError> {
        let Some(key) = self.key.take() else {
            return unsupported("map value without key");
        };
        self.array.insert(key, to_zval(value)?);
        Ok(())
    }

    fn end(self) -> Result<Zval, ConversionError> {
        Ok(Zval::Array(self.array))
    }
}

/// Structs: a `stdClass` object with one property per serialized field.
struct ObjectBuilder {
    object: PhpObject,
}

impl ser::SerializeStruct for ObjectBuilder {
    type Ok = Zval;
    type Error = ConversionError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ConversionError> {
        self.object.set_property(key, to_zval(value)?);
        Ok(())
    }

    fn end(self) -> Result<Zval, ConversionError> {
        Ok(Zval::Object(ObjectRef::new(self.object)))
    }
}

/// Map keys. Numeric strings become integer keys, as in PHP arrays.
struct KeySerializer;

impl KeySerializer {
    fn int(n: impl TryInto<i64>, what: &str) -> Result<ArrayKey, ConversionError> {
        match n.try_into() {
            Ok(n) => Ok(ArrayKey::Int(n)),
            Err(_) => unsupported(format!("map key of type {}", what)),
        }
    }
}

fn bad_key<T>(what: &str) -> Result<T, ConversionError> {
    unsupported(format!("map key of type {}", what))
}

impl ser::Serializer for KeySerializer {
    type Ok = ArrayKey;
    type Error = ConversionError;

    type SerializeSeq = Impossible<ArrayKey, ConversionError>;
    type SerializeTuple = Impossible<ArrayKey, ConversionError>;
    type SerializeTupleStruct = Impossible<ArrayKey, ConversionError>;
    type SerializeTupleVariant = Impossible<ArrayKey, ConversionError>;
    type SerializeMap = Impossible<ArrayKey, ConversionError>;
    type SerializeStruct = Impossible<ArrayKey, ConversionError>;
    type SerializeStructVariant = Impossible<ArrayKey, ConversionError>;

    fn serialize_bool(self, _v: bool) -> Result<ArrayKey, ConversionError> {
        bad_key("bool")
    }

    fn serialize_i8(self, v: i8) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "i8")
    }

    fn serialize_i16(self, v: i16) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "i16")
    }

    fn serialize_i32(self, v: i32) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "i32")
    }

    fn serialize_i64(self, v: i64) -> Result<ArrayKey, ConversionError> {
        Ok(ArrayKey::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "i128")
    }

    fn serialize_u8(self, v: u8) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "u8")
    }

    fn serialize_u16(self, v: u16) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "u16")
    }

    fn serialize_u32(self, v: u32) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "u32")
    }

    fn serialize_u64(self, v: u64) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "u64")
    }

    fn serialize_u128(self, v: u128) -> Result<ArrayKey, ConversionError> {
        Self::int(v, "u128")
    }

    fn serialize_f32(self, _v: f32) -> Result<ArrayKey, ConversionError> {
        bad_key("f32")
    }

    fn serialize_f64(self, _v: f64) -> Result<ArrayKey, ConversionError> {
        bad_key("f64")
    }

    fn serialize_char(self, v: char) -> Result<ArrayKey, ConversionError> {
        Ok(ArrayKey::from_string(&v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<ArrayKey, ConversionError> {
        Ok(ArrayKey::from_string(v))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<ArrayKey, ConversionError> {
        bad_key("bytes")
    }

    fn serialize_none(self) -> Result<ArrayKey, ConversionError> {
        bad_key("option")
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> Result<ArrayKey, ConversionError> {
        bad_key("option")
    }

    fn serialize_unit(self) -> Result<ArrayKey, ConversionError> {
        bad_key("()")
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<ArrayKey, ConversionError> {
        bad_key(name)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<ArrayKey, ConversionError> {
        Ok(ArrayKey::from_string(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<ArrayKey, ConversionError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<ArrayKey, ConversionError> {
        bad_key(name)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, ConversionError> {
        bad_key("sequence")
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, ConversionError> {
        bad_key("tuple")
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, ConversionError> {
        bad_key(name)
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, ConversionError> {
        bad_key(name)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, ConversionError> {
        bad_key("map")
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, ConversionError> {
        bad_key(name)
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, ConversionError> {
        bad_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Record {
        #[serde(rename = "Name")]
        name: &'static str,
        #[serde(skip)]
        #[allow(dead_code)]
        secret: i32,
        #[serde(rename = "Tags")]
        tags: Vec<&'static str>,
    }

    #[derive(Serialize)]
    enum Shape {
        Square,
        Circle(f64),
    }

    #[test]
    fn test_scalars() {
        assert_eq!(to_zval(&42i32), Ok(Zval::Long(42)));
        assert_eq!(to_zval(&7u8), Ok(Zval::Long(7)));
        assert_eq!(to_zval(&3.5f32), Ok(Zval::Double(3.5)));
        assert_eq!(to_zval(&true), Ok(Zval::Bool(true)));
        assert_eq!(to_zval("text"), Ok(Zval::string("text")));
        assert_eq!(to_zval(&'c'), Ok(Zval::string("c")));
        assert_eq!(to_zval(&()), Ok(Zval::Null));
        assert_eq!(to_zval(&None::<i32>), Ok(Zval::Null));
        assert_eq!(to_zval(&Some(5)), Ok(Zval::Long(5)));
    }

    #[test]
    fn test_integer_overflow_is_unsupported() {
        assert_eq!(
            to_zval(&u64::MAX),
            Err(ConversionError::UnsupportedType("u64".into()))
        );
        assert_eq!(to_zval(&(i64::MAX as u64)), Ok(Zval::Long(i64::MAX)));
        assert_eq!(to_zval(&-5i128), Ok(Zval::Long(-5)));
    }

    #[test]
    fn test_sequences_are_packed_arrays() {
        let Ok(Zval::Array(arr)) = to_zval(&vec![vec![1, 2], vec![3]]) else {
            panic!("expected an array");
        };
        assert!(arr.is_list());
        assert_eq!(arr.len(), 2);
        let Some(Zval::Array(first)) = arr.get_int(0) else {
            panic!("expected a nested array");
        };
        assert_eq!(first.get_int(1), Some(&Zval::Long(2)));

        let Ok(Zval::Array(tuple)) = to_zval(&("a", 1)) else {
            panic!("expected an array");
        };
        assert_eq!(tuple.get_int(0), Some(&Zval::string("a")));
    }

    #[test]
    fn test_maps_with_string_and_integer_keys() {
        let mut by_name = BTreeMap::new();
        by_name.insert("a", 1);
        by_name.insert("10", 2);
        let Ok(Zval::Array(arr)) = to_zval(&by_name) else {
            panic!("expected an array");
        };
        assert_eq!(arr.get_int(10), Some(&Zval::Long(2)));
        assert_eq!(arr.get_str("a"), Some(&Zval::Long(1)));

        let mut by_id = BTreeMap::new();
        by_id.insert(7u16, "x");
        let Ok(Zval::Array(arr)) = to_zval(&by_id) else {
            panic!("expected an array");
        };
        assert_eq!(arr.get_int(7), Some(&Zval::string("x")));
    }

    #[test]
    fn test_unsupported_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(true, 1);
        assert_eq!(
            to_zval(&map),
            Err(ConversionError::UnsupportedType("map key of type bool".into()))
        );
    }

    #[test]
    fn test_structs_become_stdclass_objects() {
        let record = Record {
            name: "doge",
            secret: 9,
            tags: vec!["such", "wow"],
        };
        let Ok(Zval::Object(obj)) = to_zval(&record) else {
            panic!("expected an object");
        };
        let object = obj.borrow();
        assert_eq!(object.class_name, "stdClass");
        assert_eq!(object.properties.keys().collect::<Vec<_>>(), ["Name", "Tags"]);
        assert_eq!(object.get_property("Name"), Some(&Zval::string("doge")));
    }

    #[test]
    fn test_enums() {
        assert_eq!(to_zval(&Shape::Square), Ok(Zval::string("Square")));
        assert_eq!(
            to_zval(&Shape::Circle(1.0)),
            Err(ConversionError::UnsupportedType("Shape::Circle".into()))
        );
    }

    #[test]
    fn test_failure_inside_nested_value_aborts() {
        let nested = vec![Some(1u64), Some(u64::MAX)];
        assert!(to_zval(&nested).is_err());
        assert!(to_zval(&vec![serde_bytes_like()]).is_err());
    }

    fn serde_bytes_like() -> impl Serialize {
        struct Bytes;
        impl Serialize for Bytes {
            fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_bytes(b"raw")
            }
        }
        Bytes
    }
}
