//! PHP virtual machine
//!
//! Executes parsed scripts against a host-provided [`SapiModule`]: values,
//! the tree-walking executor, built-in functions and the variable
//! serializers (serialize, var_export, var_dump, print_r, json_encode).
//! Equivalent to php-src/Zend/zend_execute.c plus the parts of
//! ext/standard and ext/json the embedding needs.

mod builtins;
pub mod json;
pub mod sapi;
pub mod value;
pub mod variables;
pub mod vm;

pub use builtins::BUILTIN_FUNCTIONS;
pub use json::{json_encode, JsonError};
pub use sapi::{ClassId, ContextId, ExistsCheck, HeaderOp, ObjectId, SapiModule};
pub use value::{ArrayKey, ObjectData, ObjectRef, PhpArray, PhpObject, Value};
pub use variables::{print_r, serialize, unserialize, var_dump, var_export, SerializeError};
pub use vm::{instance_of, is_builtin_class, Vm, VmError, VmResult, EVAL_FILE};
