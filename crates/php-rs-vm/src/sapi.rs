//! Server API seam.
//!
//! The VM never touches the host directly: output, diagnostics, headers and
//! host-defined classes all go through a [`SapiModule`], keyed by the handle
//! of the execution context (or receiver object) they concern.
//!
//! Reference: php-src/main/SAPI.h (sapi_module_struct)

use std::fmt;

use crate::value::Value;

/// Handle of one execution context (one request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

/// Handle of a host class registered as a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u64);

/// Handle of a live receiver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Header operation requested by a script (sapi_header_op_enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HeaderOp {
    /// `header("Name: value")`: replace every value of Name.
    Replace = 0,
    /// `header("Name: value", false)`: add another value.
    Append = 1,
    /// `header_remove("Name")`.
    Delete = 2,
    /// `header_remove()` with no argument.
    DeleteAll = 3,
}

impl HeaderOp {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HeaderOp::Replace),
            1 => Some(HeaderOp::Append),
            2 => Some(HeaderOp::Delete),
            3 => Some(HeaderOp::DeleteAll),
            _ => None,
        }
    }
}

/// Which question a property existence check asks (has_property's
/// `check_empty` argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExistsCheck {
    /// isset(): the property exists and is not null.
    NotNull = 0,
    /// !empty(): the property exists and is truthy.
    Truthy = 1,
    /// property_exists(): the property exists at all.
    Exists = 2,
}

/// Callbacks the VM makes into its embedding host.
///
/// Every method has a context or object handle so a single module can
/// serve many contexts. Return values follow the C SAPI conventions where
/// they have one: `write` and `log` report bytes consumed or `-1`.
pub trait SapiModule {
    /// Name reported by php_sapi_name().
    fn name(&self) -> &str {
        "embed"
    }

    /// Unbuffered output for `context`.
    fn write(&self, context: ContextId, bytes: &[u8]) -> isize;

    /// One formatted diagnostic line for `context`.
    fn log(&self, context: ContextId, message: &str) -> isize;

    /// Header change requested by the script; `line` is the raw header
    /// text (`Name: value`) or, for deletions, the header name.
    fn set_header(&self, context: ContextId, op: HeaderOp, line: &str);

    /// Resolve a class name not known to the VM. Returns the handle and the
    /// name the class was registered under.
    fn class_lookup(&self, name: &str) -> Option<(ClassId, String)> {
        let _ = name;
        None
    }

    /// Construct a receiver instance. None means construction failed.
    fn receiver_new(&self, class: ClassId, context: ContextId, args: &[Value]) -> Option<ObjectId> {
        let _ = (class, context, args);
        None
    }

    /// Read a property; None reads as null.
    fn receiver_get(&self, object: ObjectId, name: &str) -> Option<Value> {
        let _ = (object, name);
        None
    }

    /// Write a property; writes to unknown properties are dropped.
    fn receiver_set(&self, object: ObjectId, name: &str, value: &Value) {
        let _ = (object, name, value);
    }

    fn receiver_exists(&self, object: ObjectId, name: &str, check: ExistsCheck) -> bool {
        let _ = (object, name, check);
        false
    }

    /// Call a method; None means no such method, which returns null.
    fn receiver_call(&self, object: ObjectId, name: &str, args: &[Value]) -> Option<Value> {
        let _ = (object, name, args);
        None
    }
}
