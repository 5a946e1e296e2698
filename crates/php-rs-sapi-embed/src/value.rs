//! Host-owned handles to runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use php_rs_vm::value::DEFAULT_PRECISION;
use php_rs_vm::Value as Zval;
use serde::Serialize;

use crate::convert::to_zval;
use crate::error::ConversionError;
use crate::host::{map_entries, HostValue};

/// Kind of a runtime value, as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Long,
    Double,
    Bool,
    String,
    /// Array with keys `0..n-1` in order.
    Array,
    /// Any other array.
    Map,
    Object,
}

/// A runtime value owned by the host.
///
/// The handle is shared with the [`Context`](crate::Context) that produced
/// or bound it, so destroying the context releases the value too. After
/// release every accessor behaves as for `null`.
///
/// ```no_run
/// use php_rs_sapi_embed::{Kind, Value};
///
/// let value = Value::new(&vec![1, 2, 3]).unwrap();
/// assert_eq!(value.kind(), Kind::Array);
/// assert_eq!(value.slice().len(), 3);
/// ```
pub struct Value {
    zval: Rc<RefCell<Option<Zval>>>,
}

impl Value {
    /// Convert a host value. See [`to_zval`](crate::to_zval) for the mapping.
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Value, ConversionError> {
        Ok(Value::from_zval(to_zval(value)?))
    }

    /// Wrap an existing runtime value.
    pub fn from_zval(zval: Zval) -> Value {
        Value {
            zval: Rc::new(RefCell::new(Some(zval))),
        }
    }

    /// Indexed array of the given values, in order; released values are
    /// stored as null.
    pub fn array(values: &[Value]) -> Value {
        let items = values.iter().map(|value| value.zval().unwrap_or_default());
        Value::from_zval(Zval::Array(items.collect()))
    }

    /// A second handle to the same runtime value.
    pub(crate) fn share(&self) -> Value {
        Value {
            zval: Rc::clone(&self.zval),
        }
    }

    /// The wrapped runtime value, or None once released.
    pub fn zval(&self) -> Option<Zval> {
        self.zval.borrow().clone()
    }

    fn with<R>(&self, f: impl FnOnce(&Zval) -> R) -> R {
        let guard = self.zval.borrow();
        let result = match guard.as_ref() {
            Some(zval) => f(zval),
            None => f(&Zval::Null),
        };
        result
    }

    pub fn kind(&self) -> Kind {
        self.with(|zval| match zval {
            Zval::Null => Kind::Null,
            Zval::Long(_) => Kind::Long,
            Zval::Double(_) => Kind::Double,
            Zval::Bool(_) => Kind::Bool,
            Zval::String(_) => Kind::String,
            Zval::Array(arr) if arr.is_list() => Kind::Array,
            Zval::Array(_) => Kind::Map,
            Zval::Object(_) => Kind::Object,
        })
    }

    /// Natural host conversion.
    pub fn interface(&self) -> HostValue {
        self.with(HostValue::from_zval)
    }

    /// Integer value with PHP's conversion rules.
    pub fn int(&self) -> i64 {
        self.with(Zval::to_long)
    }

    pub fn float(&self) -> f64 {
        self.with(Zval::to_double)
    }

    /// Truthiness with PHP's conversion rules (empty array is false).
    pub fn bool(&self) -> bool {
        self.with(Zval::to_bool)
    }

    /// String value with PHP's conversion rules. Floats use 14 significant
    /// digits, arrays read as `"Array"` and objects as `""`.
    pub fn string(&self) -> String {
        self.with(|zval| zval.to_php_string_with(DEFAULT_PRECISION))
    }

    /// Elements in order. Maps and objects yield their values; any other
    /// value yields a single element.
    pub fn slice(&self) -> Vec<HostValue> {
        self.with(|zval| match zval {
            Zval::Array(arr) => arr.values().map(HostValue::from_zval).collect(),
            Zval::Object(obj) => obj
                .borrow()
                .properties
                .values()
                .map(HostValue::from_zval)
                .collect(),
            other => vec![HostValue::from_zval(other)],
        })
    }

    /// Entries keyed by their decimal or string key. Objects yield their
    /// properties; any other value yields `{"0": value}`.
    pub fn map(&self) -> IndexMap<String, HostValue> {
        self.with(|zval| match zval {
            Zval::Array(arr) => map_entries(arr),
            Zval::Object(obj) => obj
                .borrow()
                .properties
                .iter()
                .map(|(name, value)| (name.clone(), HostValue::from_zval(value)))
                .collect(),
            other => IndexMap::from([("0".to_string(), HostValue::from_zval(other))]),
        })
    }

    /// Release the runtime value. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.release();
    }

    pub(crate) fn release(&self) {
        let released = self.zval.borrow_mut().take();
        drop(released);
    }

    pub fn is_destroyed(&self) -> bool {
        self.zval.borrow().is_none()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.zval.borrow().as_ref() {
            Some(zval) => f.debug_tuple("Value").field(zval).finish(),
            None => f.write_str("Value(<destroyed>)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string())
    }
}
