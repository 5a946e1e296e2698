//! Host types exposed to scripts as classes.
//!
//! A host type opts in by implementing [`Exported`], which lists the fields
//! and methods scripts may see. [`Engine::define`](crate::Engine::define)
//! registers the type under a class name; `new ClassName(...)` in a script
//! then runs the host constructor and property/method access on the object
//! is routed back to the host value.
//!
//! ```no_run
//! use php_rs_sapi_embed::{Descriptor, Engine, Exported, Returns};
//!
//! struct Widget {
//!     var: String,
//! }
//!
//! impl Exported for Widget {
//!     fn describe(d: &mut Descriptor<Self>) {
//!         d.field_mut("Var", |w: &Widget| w.var.clone(), |w, v| w.var = v)
//!             .method("Shout", |w, _args| Returns::single(w.var.to_uppercase()));
//!     }
//! }
//!
//! let engine = Engine::new().unwrap();
//! engine
//!     .define("Widget", |_args| Some(Widget { var: "hello".into() }))
//!     .unwrap();
//! let ctx = engine.new_context().unwrap();
//! ctx.eval("$w = new Widget; echo $w->Shout();").unwrap();
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use php_rs_vm::{ClassId, ExistsCheck, Value as Zval};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::convert::to_zval;
use crate::engine::EngineInner;
use crate::error::{ConversionError, ReceiverError};
use crate::host::HostValue;
use crate::value::Value;

/// A host type whose members scripts can reach.
pub trait Exported: Sized + 'static {
    /// List the visible fields and methods. Called once per
    /// [`Engine::define`](crate::Engine::define).
    fn describe(descriptor: &mut Descriptor<Self>);
}

type Getter<T> = Box<dyn Fn(&T) -> Result<Zval, ConversionError>>;
type Setter<T> = Box<dyn Fn(&mut T, &HostValue)>;
type Invoker<T> = Box<dyn Fn(&mut T, &[HostValue]) -> Returns>;

struct Field<T> {
    get: Getter<T>,
    set: Option<Setter<T>>,
}

/// Table of the members of `T` visible to scripts.
///
/// Field names are case-sensitive, like PHP properties. Method names are
/// matched case-insensitively, like PHP methods.
pub struct Descriptor<T> {
    fields: IndexMap<String, Field<T>>,
    methods: IndexMap<String, Invoker<T>>,
}

impl<T: 'static> Descriptor<T> {
    fn new() -> Self {
        Self {
            fields: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }

    /// Read-only field. Script writes to it are ignored.
    pub fn field<V, G>(&mut self, name: &str, get: G) -> &mut Self
    where
        V: Serialize,
        G: Fn(&T) -> V + 'static,
    {
        let get: Getter<T> = Box::new(move |inner| to_zval(&get(inner)));
        self.fields.insert(name.to_string(), Field { get, set: None });
        self
    }

    /// Assignable field. A script write that does not decode as `V` is
    /// ignored.
    pub fn field_mut<V, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        V: Serialize + DeserializeOwned,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let get: Getter<T> = Box::new(move |inner| to_zval(&get(inner)));
        let set: Setter<T> = Box::new(move |inner, value| {
            if let Ok(value) = value.decode::<V>() {
                set(inner, value);
            }
        });
        self.fields.insert(
            name.to_string(),
            Field {
                get,
                set: Some(set),
            },
        );
        self
    }

    pub fn method<F>(&mut self, name: &str, invoke: F) -> &mut Self
    where
        F: Fn(&mut T, &[HostValue]) -> Returns + 'static,
    {
        self.methods.insert(name.to_ascii_lowercase(), Box::new(invoke));
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(&name.to_ascii_lowercase())
    }
}

impl<T> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Method results ──

/// What a host method hands back to the script.
#[derive(Debug, Default)]
pub enum Returns {
    #[default]
    None,
    Single(Value),
    Multiple(Vec<Value>),
}

impl Returns {
    /// One return value. A value with no runtime representation returns
    /// nothing.
    pub fn single<V: Serialize>(value: V) -> Returns {
        Value::new(&value).map(Returns::Single).unwrap_or_default()
    }

    /// Several return values, in order. If any of them has no runtime
    /// representation the method returns nothing.
    pub fn multiple<I, V>(values: I) -> Returns
    where
        I: IntoIterator<Item = V>,
        V: Serialize,
    {
        values
            .into_iter()
            .map(|value| Value::new(&value))
            .collect::<Result<Vec<_>, _>>()
            .map(Returns::Multiple)
            .unwrap_or_default()
    }

    /// The value the script sees: nothing for zero values, the value itself
    /// for one, an indexed array for more.
    pub fn collapse(self) -> Option<Value> {
        match self {
            Returns::None => None,
            Returns::Single(value) => Some(value),
            Returns::Multiple(mut values) => match values.len() {
                0 => None,
                1 => values.pop(),
                _ => Some(Value::array(&values)),
            },
        }
    }
}

// ── Receiver classes ──

pub(crate) type Constructor<T> = Box<dyn Fn(&[HostValue]) -> Option<T>>;

/// Everything needed to build instances of one class.
pub(crate) struct ReceiverClass<T> {
    pub(crate) name: String,
    construct: Constructor<T>,
    descriptor: Rc<Descriptor<T>>,
}

impl<T: Exported> ReceiverClass<T> {
    pub(crate) fn new(name: &str, construct: Constructor<T>) -> Self {
        let mut descriptor = Descriptor::new();
        T::describe(&mut descriptor);
        Self {
            name: name.to_string(),
            construct,
            descriptor: Rc::new(descriptor),
        }
    }

    pub(crate) fn instantiate(&self, args: &[HostValue]) -> Result<ReceiverObject<T>, ReceiverError> {
        match (self.construct)(args) {
            Some(inner) => Ok(ReceiverObject {
                inner,
                descriptor: Rc::clone(&self.descriptor),
            }),
            None => Err(ReceiverError::Instantiation(self.name.clone())),
        }
    }
}

/// Handle to a class registered with [`Engine::define`](crate::Engine::define).
///
/// The class stays visible to scripts until [`Receiver::destroy`] or until
/// the engine is destroyed; dropping the handle does not unregister it.
pub struct Receiver<T: Exported> {
    class: ClassId,
    shared: Rc<ReceiverClass<T>>,
    engine: Rc<EngineInner>,
    destroyed: bool,
}

impl<T: Exported> Receiver<T> {
    pub(crate) fn new(class: ClassId, shared: Rc<ReceiverClass<T>>, engine: Rc<EngineInner>) -> Self {
        Self {
            class,
            shared,
            engine,
            destroyed: false,
        }
    }

    /// Class name as registered.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Run the host constructor directly.
    ///
    /// The object belongs to the caller and is not known to scripts or to
    /// any context. [`Receiver::destroy`] leaves it usable; it only releases
    /// the instances scripts created with `new`.
    pub fn instantiate(&self, args: &[HostValue]) -> Result<ReceiverObject<T>, ReceiverError> {
        self.shared.instantiate(args)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed || self.engine.is_destroyed()
    }

    /// Unregister the class and release every instance scripts created.
    /// Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.engine.unregister(self.class);
    }
}

impl<T: Exported> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("name", &self.shared.name)
            .field("class", &self.class)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ── Instances ──

/// One constructed host object together with its member table.
pub struct ReceiverObject<T> {
    inner: T,
    descriptor: Rc<Descriptor<T>>,
}

impl<T: 'static> ReceiverObject<T> {
    /// Current value of a field.
    pub fn get(&self, name: &str) -> Result<Value, ReceiverError> {
        Ok(Value::from_zval(self.get_zval(name)?))
    }

    fn get_zval(&self, name: &str) -> Result<Zval, ReceiverError> {
        let field = self
            .descriptor
            .fields
            .get(name)
            .ok_or_else(|| ReceiverError::UnknownField(name.to_string()))?;
        Ok((field.get)(&self.inner)?)
    }

    /// Assign a field. Unknown and read-only fields, and values of the wrong
    /// shape, are ignored.
    pub fn set(&mut self, name: &str, value: &Value) {
        self.set_host(name, &value.interface());
    }

    fn set_host(&mut self, name: &str, value: &HostValue) {
        if let Some(set) = self.descriptor.fields.get(name).and_then(|f| f.set.as_ref()) {
            set(&mut self.inner, value);
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.descriptor.has_field(name)
    }

    /// Invoke a method. None if the method is unknown or returns nothing.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Option<Value> {
        let args: Vec<HostValue> = args.iter().map(Value::interface).collect();
        self.call_host(name, &args)
    }

    fn call_host(&mut self, name: &str, args: &[HostValue]) -> Option<Value> {
        let invoke = self.descriptor.methods.get(&name.to_ascii_lowercase())?;
        invoke(&mut self.inner, args).collapse()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for ReceiverObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverObject")
            .field("inner", &self.inner)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Type-erased instance as the engine stores it.
pub(crate) trait Instance {
    fn get(&self, name: &str) -> Option<Zval>;
    fn set(&mut self, name: &str, value: &Zval);
    fn exists(&self, name: &str, check: ExistsCheck) -> bool;
    fn call(&mut self, name: &str, args: &[Zval]) -> Option<Zval>;
}

pub(crate) type SharedInstance = Rc<RefCell<dyn Instance>>;

impl<T: 'static> Instance for ReceiverObject<T> {
    fn get(&self, name: &str) -> Option<Zval> {
        self.get_zval(name).ok()
    }

    fn set(&mut self, name: &str, value: &Zval) {
        self.set_host(name, &HostValue::from_zval(value));
    }

    fn exists(&self, name: &str, check: ExistsCheck) -> bool {
        match check {
            ExistsCheck::Exists => self.exists(name),
            ExistsCheck::NotNull => self.get_zval(name).is_ok_and(|v| !v.is_null()),
            ExistsCheck::Truthy => self.get_zval(name).is_ok_and(|v| v.to_bool()),
        }
    }

    fn call(&mut self, name: &str, args: &[Zval]) -> Option<Zval> {
        let args: Vec<HostValue> = args.iter().map(HostValue::from_zval).collect();
        self.call_host(name, &args)?.zval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Widget {
        var: String,
        count: i64,
        secret: u8,
    }

    impl Exported for Widget {
        fn describe(d: &mut Descriptor<Self>) {
            d.field_mut("Var", |w: &Widget| w.var.clone(), |w, v| w.var = v)
                .field_mut("Count", |w: &Widget| w.count, |w, n| w.count = n)
                .field("Empty", |_: &Widget| Option::<i64>::None)
                .method("Goodbye", |w, _| {
                    Returns::multiple([String::from("Goodbye"), w.var.clone()])
                })
                .method("Bump", |w, args| {
                    w.count += args.first().and_then(HostValue::as_i64).unwrap_or(1);
                    Returns::None
                })
                .method("Count", |w, _| Returns::single(w.count));
        }
    }

    fn widget_class() -> ReceiverClass<Widget> {
        ReceiverClass::new(
            "Widget",
            Box::new(|args: &[HostValue]| match args.first() {
                Some(HostValue::Bool(false)) => None,
                _ => Some(Widget {
                    var: "hello".into(),
                    count: 0,
                    secret: 7,
                }),
            }),
        )
    }

    #[test]
    fn test_instantiate() {
        let class = widget_class();
        let object = class.instantiate(&[]).unwrap();
        assert_eq!(object.inner().var, "hello");
        assert_eq!(object.inner().secret, 7);
        assert_eq!(
            class.instantiate(&[HostValue::Bool(false)]).unwrap_err(),
            ReceiverError::Instantiation("Widget".into())
        );
    }

    #[test]
    fn test_get_known_and_unknown_fields() {
        let object = widget_class().instantiate(&[]).unwrap();
        assert_eq!(object.get("Var").unwrap().string(), "hello");
        assert_eq!(
            object.get("secret").unwrap_err(),
            ReceiverError::UnknownField("secret".into())
        );
        assert_eq!(
            object.get("var").unwrap_err(),
            ReceiverError::UnknownField("var".into())
        );
    }

    #[test]
    fn test_set_ignores_unknown_read_only_and_mismatched() {
        let mut object = widget_class().instantiate(&[]).unwrap();
        object.set("Var", &Value::new("bye").unwrap());
        assert_eq!(object.inner().var, "bye");

        object.set("Var", &Value::new(&5).unwrap());
        object.set("Empty", &Value::new(&5).unwrap());
        object.set("Missing", &Value::new(&5).unwrap());
        assert_eq!(object.inner().var, "bye");
        assert!(object.get("Empty").unwrap().kind() == crate::Kind::Null);
    }

    #[test]
    fn test_exists_checks() {
        let object = widget_class().instantiate(&[]).unwrap();
        assert!(object.exists("Var"));
        assert!(!object.exists("Nope"));
        let erased: &dyn Instance = &object;
        assert!(erased.exists("Empty", ExistsCheck::Exists));
        assert!(!erased.exists("Empty", ExistsCheck::NotNull));
        assert!(erased.exists("Count", ExistsCheck::NotNull));
        assert!(!erased.exists("Count", ExistsCheck::Truthy));
        assert!(erased.exists("Var", ExistsCheck::Truthy));
    }

    #[test]
    fn test_call_return_policy() {
        let mut object = widget_class().instantiate(&[]).unwrap();
        let goodbye = object.call("goodbye", &[]).unwrap();
        assert_eq!(
            goodbye.slice(),
            vec![HostValue::from("Goodbye"), HostValue::from("hello")]
        );
        assert!(object.call("Bump", &[Value::new(&4).unwrap()]).is_none());
        assert_eq!(object.call("COUNT", &[]).unwrap().int(), 4);
        assert!(object.call("Missing", &[]).is_none());
    }

    #[test]
    fn test_collapse() {
        assert!(Returns::None.collapse().is_none());
        assert!(Returns::multiple(Vec::<i64>::new()).collapse().is_none());
        assert_eq!(Returns::multiple([9]).collapse().unwrap().int(), 9);
        let many = Returns::multiple([1, 2]).collapse().unwrap();
        assert_eq!(many.kind(), crate::Kind::Array);
        assert!(matches!(Returns::single(f64::NAN), Returns::Single(_)));
        assert!(matches!(Returns::single(u64::MAX), Returns::None));
    }

    #[test]
    fn test_descriptor_lookup() {
        let class = widget_class();
        assert!(class.descriptor.has_method("GOODBYE"));
        assert!(class.descriptor.has_field("Count"));
        assert!(!class.descriptor.has_field("count"));
    }
}
