//! The embedded runtime and its handle registry.
//!
//! The VM reaches back into the host through [`SapiModule`]. Every context
//! gets a `Router` that resolves the integer handles the VM passes in
//! (context, class, object) through the engine's registry. Registry
//! borrows are always released before host code (sinks, constructors,
//! receiver methods) runs.
//!
//! Equivalent to php-src/sapi/embed/php_embed.c

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use php_rs_runtime::ini::parse_ini_pairs;
use php_rs_runtime::IniSystem;
use php_rs_vm::{
    is_builtin_class, ClassId, ContextId, ExistsCheck, HeaderOp, ObjectId, SapiModule,
    Value as Zval, Vm,
};

use crate::context::Context;
use crate::error::{EngineError, ReceiverError};
use crate::headers::Headers;
use crate::host::HostValue;
use crate::receiver::{Exported, Receiver, ReceiverClass, SharedInstance};
use crate::value::Value;

/// A shared output or log sink.
pub type Sink = Rc<RefCell<dyn Write>>;

/// INI directives every embedded context starts from.
pub const EMBED_INI: &[(&str, &str)] = &[
    ("display_errors", "0"),
    ("log_errors", "1"),
    ("error_reporting", "32767"),
    ("html_errors", "0"),
    ("implicit_flush", "1"),
    ("output_buffering", "0"),
    ("max_execution_time", "0"),
    ("max_input_time", "-1"),
    ("register_argc_argv", "1"),
    ("default_mimetype", ""),
    ("precision", "14"),
    ("serialize_precision", "-1"),
];

/// Set while an engine is alive anywhere in the process.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes tests that create an engine, since only one may be alive.
#[cfg(test)]
pub(crate) fn exclusive() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Configuration ───────────────────────────────────────────────────────────

/// INI overrides applied to every context on top of [`EMBED_INI`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    ini: Vec<(String, String)>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one directive. Later settings win.
    pub fn ini(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ini.push((name.into(), value.into()));
        self
    }

    /// Apply every `key = value` line of a php.ini document.
    pub fn ini_file(mut self, content: &str) -> Self {
        self.ini.extend(parse_ini_pairs(content));
        self
    }

    pub fn overrides(&self) -> &[(String, String)] {
        &self.ini
    }

    /// Directive table for a new context.
    pub(crate) fn build_ini(&self) -> IniSystem {
        let mut ini = IniSystem::new();
        for (name, value) in EMBED_INI {
            ini.set_system(name, *value);
        }
        for (name, value) in &self.ini {
            ini.set_system(name, value.as_str());
        }
        ini
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

pub(crate) struct ContextSlot {
    pub(crate) output: Option<Sink>,
    pub(crate) log: Option<Sink>,
    pub(crate) headers: Rc<RefCell<Headers>>,
    pub(crate) vm: Rc<RefCell<Option<Vm>>>,
    /// Values bound into or returned from this context.
    pub(crate) values: Vec<Value>,
}

type Factory = Rc<dyn Fn(&[HostValue]) -> Option<SharedInstance>>;

struct ClassSlot {
    name: String,
    factory: Factory,
}

struct ObjectSlot {
    class: ClassId,
    context: ContextId,
    instance: SharedInstance,
}

/// Everything the engine owns, keyed by handle.
#[derive(Default)]
pub(crate) struct Registry {
    contexts: HashMap<ContextId, ContextSlot>,
    /// Lowercased class name to handle.
    names: HashMap<String, ClassId>,
    classes: HashMap<ClassId, ClassSlot>,
    objects: HashMap<ObjectId, ObjectSlot>,
    next_id: u64,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// What is left to release once the registry borrow has ended.
#[derive(Default)]
pub(crate) struct Released {
    contexts: Vec<ContextSlot>,
    instances: Vec<SharedInstance>,
    factories: Vec<Factory>,
}

impl Released {
    /// Release values, then instances, then the VMs.
    pub(crate) fn finish(self) {
        for slot in &self.contexts {
            for value in &slot.values {
                value.release();
            }
        }
        drop(self.instances);
        drop(self.factories);
        for slot in self.contexts {
            // A context still running a script keeps its VM until it returns.
            if let Ok(mut vm) = slot.vm.try_borrow_mut() {
                vm.take();
            }
        }
    }
}

pub(crate) struct EngineInner {
    registry: RefCell<Registry>,
    config: EngineConfig,
    destroyed: Cell<bool>,
}

impl EngineInner {
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Run `f` on a live context's slot.
    pub(crate) fn with_context<R>(&self, id: ContextId, f: impl FnOnce(&mut ContextSlot) -> R) -> Option<R> {
        if self.is_destroyed() {
            return None;
        }
        let mut registry = self.registry.try_borrow_mut().ok()?;
        registry.contexts.get_mut(&id).map(f)
    }

    /// Remove a context and the receiver instances scripts created in it.
    pub(crate) fn remove_context(&self, id: ContextId) -> Released {
        let mut released = Released::default();
        let Ok(mut registry) = self.registry.try_borrow_mut() else {
            return released;
        };
        released.contexts.extend(registry.contexts.remove(&id));
        let objects: Vec<ObjectId> = registry
            .objects
            .iter()
            .filter(|(_, slot)| slot.context == id)
            .map(|(object, _)| *object)
            .collect();
        for object in objects {
            released.instances.extend(registry.objects.remove(&object).map(|slot| slot.instance));
        }
        released
    }

    /// Forget a class and release its instances.
    pub(crate) fn unregister(&self, class: ClassId) {
        let released = {
            let mut released = Released::default();
            let Ok(mut registry) = self.registry.try_borrow_mut() else {
                return;
            };
            if let Some(slot) = registry.classes.remove(&class) {
                registry.names.remove(&slot.name.to_ascii_lowercase());
                released.factories.push(slot.factory);
            }
            let objects: Vec<ObjectId> = registry
                .objects
                .iter()
                .filter(|(_, slot)| slot.class == class)
                .map(|(object, _)| *object)
                .collect();
            for object in objects {
                released.instances.extend(registry.objects.remove(&object).map(|slot| slot.instance));
            }
            released
        };
        released.finish();
    }

    fn instance(&self, object: ObjectId) -> Option<SharedInstance> {
        let registry = self.registry.try_borrow().ok()?;
        registry.objects.get(&object).map(|slot| Rc::clone(&slot.instance))
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// The embedded runtime.
///
/// Only one engine may be active per process; [`Engine::new`] fails with
/// [`EngineError::AlreadyActive`] until the active one is destroyed or
/// dropped. Classes registered with [`Engine::define`] are visible to every
/// context of the engine; instances belong to the context whose script
/// created them.
///
/// ```no_run
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use php_rs_sapi_embed::Engine;
///
/// let engine = Engine::new().unwrap();
/// let mut ctx = engine.new_context().unwrap();
/// let out = Rc::new(RefCell::new(Vec::<u8>::new()));
/// ctx.set_output(out.clone());
/// ctx.bind("name", "World").unwrap();
/// ctx.eval("echo \"Hello, $name!\";").unwrap();
/// assert_eq!(&*out.borrow(), b"Hello, World!");
/// ```
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    pub fn new() -> Result<Engine, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Engine, EngineError> {
        if ACTIVE.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyActive);
        }
        Ok(Engine {
            inner: Rc::new(EngineInner {
                registry: RefCell::new(Registry::default()),
                config,
                destroyed: Cell::new(false),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start an execution context with its own globals, sinks and headers.
    pub fn new_context(&self) -> Result<Context, EngineError> {
        if self.inner.is_destroyed() {
            return Err(EngineError::Destroyed);
        }
        let mut registry = self
            .inner
            .registry
            .try_borrow_mut()
            .map_err(|_| EngineError::Destroyed)?;
        let id = ContextId(registry.next_id());
        let router: Rc<dyn SapiModule> = Rc::new(Router {
            engine: Rc::downgrade(&self.inner),
        });
        let vm = Rc::new(RefCell::new(Some(Vm::new(
            id,
            router,
            self.inner.config.build_ini(),
        ))));
        let headers = Rc::new(RefCell::new(Headers::new()));
        registry.contexts.insert(
            id,
            ContextSlot {
                output: None,
                log: None,
                headers: Rc::clone(&headers),
                vm: Rc::clone(&vm),
                values: Vec::new(),
            },
        );
        Ok(Context::new(id, Rc::clone(&self.inner), vm, headers))
    }

    /// Expose `T` to scripts as class `name`.
    ///
    /// `construct` receives the arguments of `new name(...)`; returning
    /// None makes `new` throw a catchable
    /// `Exception("Failed to instantiate method receiver")`. Names are
    /// compared case-insensitively and may not shadow a built-in class.
    pub fn define<T, F>(&self, name: &str, construct: F) -> Result<Receiver<T>, ReceiverError>
    where
        T: Exported,
        F: Fn(&[HostValue]) -> Option<T> + 'static,
    {
        if self.inner.is_destroyed() {
            return Err(EngineError::Destroyed.into());
        }
        let key = name.to_ascii_lowercase();
        if is_builtin_class(name) || self.inner.registry.borrow().names.contains_key(&key) {
            return Err(ReceiverError::Duplicate(name.to_string()));
        }

        let class = Rc::new(ReceiverClass::<T>::new(name, Box::new(construct)));
        let shared = Rc::clone(&class);
        let factory: Factory = Rc::new(move |args: &[HostValue]| {
            let object = shared.instantiate(args).ok()?;
            Some(Rc::new(RefCell::new(object)) as SharedInstance)
        });

        let mut registry = self.inner.registry.borrow_mut();
        let id = ClassId(registry.next_id());
        registry.names.insert(key, id);
        registry.classes.insert(
            id,
            ClassSlot {
                name: name.to_string(),
                factory,
            },
        );
        Ok(Receiver::new(id, class, Rc::clone(&self.inner)))
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Release every receiver, then every context, then the runtime.
    /// Safe to call more than once; also runs on drop.
    pub fn destroy(&mut self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        let registry = std::mem::take(&mut *self.inner.registry.borrow_mut());
        let released = Released {
            contexts: registry.contexts.into_values().collect(),
            instances: registry.objects.into_values().map(|slot| slot.instance).collect(),
            factories: registry.classes.into_values().map(|slot| slot.factory).collect(),
        };
        released.finish();
        ACTIVE.store(false, Ordering::Release);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.try_borrow();
        let mut s = f.debug_struct("Engine");
        if let Ok(registry) = &registry {
            s.field("contexts", &registry.contexts.len())
                .field("classes", &registry.classes.len())
                .field("objects", &registry.objects.len());
        }
        s.field("destroyed", &self.is_destroyed()).finish()
    }
}

// ── SAPI callbacks ──────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Stream {
    Output,
    Log,
}

/// The [`SapiModule`] handed to each context's VM.
struct Router {
    engine: Weak<EngineInner>,
}

impl Router {
    /// The sink configured for `stream`, or Err for an unknown context.
    fn sink(&self, context: ContextId, stream: Stream) -> Result<Option<Sink>, ()> {
        let engine = self.engine.upgrade().ok_or(())?;
        engine
            .with_context(context, |slot| match stream {
                Stream::Output => slot.output.clone(),
                Stream::Log => slot.log.clone(),
            })
            .ok_or(())
    }

    fn emit(&self, context: ContextId, stream: Stream, bytes: &[u8]) -> isize {
        match self.sink(context, stream) {
            Ok(Some(sink)) => write_sink(&sink, bytes),
            Ok(None) => bytes.len() as isize,
            Err(()) => -1,
        }
    }

    fn instance(&self, object: ObjectId) -> Option<SharedInstance> {
        self.engine.upgrade()?.instance(object)
    }
}

/// Write all of `bytes`; `-1` on error or if the sink is in use.
fn write_sink(sink: &Sink, bytes: &[u8]) -> isize {
    let Ok(mut writer) = sink.try_borrow_mut() else {
        return -1;
    };
    match writer.write_all(bytes) {
        Ok(()) => bytes.len() as isize,
        Err(_) => -1,
    }
}

impl SapiModule for Router {
    fn write(&self, context: ContextId, bytes: &[u8]) -> isize {
        self.emit(context, Stream::Output, bytes)
    }

    fn log(&self, context: ContextId, message: &str) -> isize {
        self.emit(context, Stream::Log, message.as_bytes())
    }

    fn set_header(&self, context: ContextId, op: HeaderOp, line: &str) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        if let Some(headers) = engine.with_context(context, |slot| Rc::clone(&slot.headers)) {
            headers.borrow_mut().apply(op, line);
        }
    }

    fn class_lookup(&self, name: &str) -> Option<(ClassId, String)> {
        let engine = self.engine.upgrade()?;
        let registry = engine.registry.try_borrow().ok()?;
        let name = name.trim_start_matches('\\').to_ascii_lowercase();
        let id = *registry.names.get(&name)?;
        let class = registry.classes.get(&id)?;
        Some((id, class.name.clone()))
    }

    fn receiver_new(&self, class: ClassId, context: ContextId, args: &[Zval]) -> Option<ObjectId> {
        let engine = self.engine.upgrade()?;
        let factory = {
            let registry = engine.registry.try_borrow().ok()?;
            Rc::clone(&registry.classes.get(&class)?.factory)
        };
        let args: Vec<HostValue> = args.iter().map(HostValue::from_zval).collect();
        let instance = factory(&args)?;

        let mut registry = engine.registry.try_borrow_mut().ok()?;
        let id = ObjectId(registry.next_id());
        registry.objects.insert(
            id,
            ObjectSlot {
                class,
                context,
                instance,
            },
        );
        Some(id)
    }

    fn receiver_get(&self, object: ObjectId, name: &str) -> Option<Zval> {
        let instance = self.instance(object)?;
        // Bound first so the borrow guard drops before `instance`.
        let value = instance.try_borrow().ok()?.get(name);
        value
    }

    fn receiver_set(&self, object: ObjectId, name: &str, value: &Zval) {
        if let Some(instance) = self.instance(object) {
            if let Ok(mut instance) = instance.try_borrow_mut() {
                instance.set(name, value);
            }
        }
    }

    fn receiver_exists(&self, object: ObjectId, name: &str, check: ExistsCheck) -> bool {
        let Some(instance) = self.instance(object) else {
            return false;
        };
        // Bound first so the borrow guard drops before `instance`.
        let exists = instance
            .try_borrow()
            .is_ok_and(|instance| instance.exists(name, check));
        exists
    }

    fn receiver_call(&self, object: ObjectId, name: &str, args: &[Zval]) -> Option<Zval> {
        let instance = self.instance(object)?;
        // Bound first so the borrow guard drops before `instance`.
        let result = instance.try_borrow_mut().ok()?.call(name, args);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::{Descriptor, Returns};

    struct Lamp {
        on: bool,
    }

    impl Exported for Lamp {
        fn describe(d: &mut Descriptor<Self>) {
            d.field_mut("On", |l: &Lamp| l.on, |l, on| l.on = on)
                .method("Toggle", |l, _| {
                    l.on = !l.on;
                    Returns::single(l.on)
                });
        }
    }

    fn lamp(args: &[HostValue]) -> Option<Lamp> {
        Some(Lamp {
            on: args.first().and_then(HostValue::as_bool).unwrap_or(false),
        })
    }

    #[test]
    fn test_single_active_engine() {
        let _lock = exclusive();
        let mut engine = Engine::new().unwrap();
        assert_eq!(Engine::new().unwrap_err(), EngineError::AlreadyActive);
        engine.destroy();
        engine.destroy();
        let second = Engine::new().unwrap();
        drop(second);
        assert!(Engine::new().is_ok());
    }

    #[test]
    fn test_active_engine_blocks_other_threads() {
        let _lock = exclusive();
        let engine = Engine::new().unwrap();
        let elsewhere = std::thread::spawn(|| Engine::new().err()).join().unwrap();
        assert_eq!(elsewhere, Some(EngineError::AlreadyActive));

        drop(engine);
        let elsewhere = std::thread::spawn(|| Engine::new().is_ok()).join().unwrap();
        assert!(elsewhere);
        assert!(Engine::new().is_ok());
    }

    #[test]
    fn test_config_layers_over_embed_defaults() {
        let config = EngineConfig::new()
            .ini("precision", "17")
            .ini_file("; comment\nlog_errors = Off\n");
        let ini = config.build_ini();
        assert_eq!(ini.get("precision"), "17");
        assert_eq!(ini.get("log_errors"), "Off");
        assert_eq!(ini.get("display_errors"), "0");
        assert_eq!(ini.get("serialize_precision"), "-1");
        assert_eq!(ini.get("default_mimetype"), "");
        assert_eq!(config.overrides().len(), 2);
    }

    #[test]
    fn test_define_rejects_duplicates() {
        let _lock = exclusive();
        let engine = Engine::new().unwrap();
        engine.define("Lamp", lamp).unwrap();
        assert_eq!(
            engine.define("lamp", lamp).unwrap_err(),
            ReceiverError::Duplicate("lamp".into())
        );
        assert_eq!(
            engine.define("Exception", lamp).unwrap_err(),
            ReceiverError::Duplicate("Exception".into())
        );
    }

    #[test]
    fn test_router_dispatch() {
        let _lock = exclusive();
        let engine = Engine::new().unwrap();
        let _class = engine.define("Lamp", lamp).unwrap();
        let ctx = engine.new_context().unwrap();
        let router = Router {
            engine: Rc::downgrade(&engine.inner),
        };

        let (class, name) = router.class_lookup("\\LAMP").unwrap();
        assert_eq!(name, "Lamp");
        let object = router
            .receiver_new(class, ctx.id(), &[Zval::Bool(true)])
            .unwrap();
        assert_eq!(router.receiver_get(object, "On"), Some(Zval::Bool(true)));
        assert!(router.receiver_exists(object, "On", ExistsCheck::Truthy));
        assert_eq!(router.receiver_call(object, "toggle", &[]), Some(Zval::Bool(false)));
        router.receiver_set(object, "On", &Zval::Bool(true));
        assert_eq!(router.receiver_get(object, "On"), Some(Zval::Bool(true)));
        router.receiver_set(object, "On", &Zval::string("yes"));
        assert_eq!(router.receiver_get(object, "On"), Some(Zval::Bool(true)));
        assert_eq!(router.receiver_get(object, "Missing"), None);
        assert_eq!(router.receiver_call(object, "Missing", &[]), None);
    }

    #[test]
    fn test_write_contract() {
        let _lock = exclusive();
        let engine = Engine::new().unwrap();
        let mut ctx = engine.new_context().unwrap();
        let router = Router {
            engine: Rc::downgrade(&engine.inner),
        };

        assert_eq!(router.write(ctx.id(), b"swallowed"), 9);
        assert_eq!(router.write(ContextId(999), b"x"), -1);

        let out = Rc::new(RefCell::new(Vec::<u8>::new()));
        ctx.set_output(out.clone());
        assert_eq!(router.write(ctx.id(), b"abc"), 3);
        assert_eq!(&*out.borrow(), b"abc");

        let held = out.borrow_mut();
        assert_eq!(router.write(ctx.id(), b"busy"), -1);
        drop(held);

        ctx.destroy();
        assert_eq!(router.write(ctx.id(), b"gone"), -1);
    }

    #[test]
    fn test_failing_sink_reports_error() {
        let _lock = exclusive();
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("broken"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let engine = Engine::new().unwrap();
        let mut ctx = engine.new_context().unwrap();
        ctx.set_log(Rc::new(RefCell::new(Broken)));
        let router = Router {
            engine: Rc::downgrade(&engine.inner),
        };
        assert_eq!(router.log(ctx.id(), "PHP Notice:  x\n"), -1);
    }

    #[test]
    fn test_unregister_releases_instances() {
        let _lock = exclusive();
        let engine = Engine::new().unwrap();
        let mut class = engine.define("Lamp", lamp).unwrap();
        let ctx = engine.new_context().unwrap();
        let router = Router {
            engine: Rc::downgrade(&engine.inner),
        };
        let (id, _) = router.class_lookup("Lamp").unwrap();
        let object = router.receiver_new(id, ctx.id(), &[]).unwrap();

        class.destroy();
        class.destroy();
        assert!(class.is_destroyed());
        assert!(router.class_lookup("Lamp").is_none());
        assert_eq!(router.receiver_get(object, "On"), None);
        assert!(engine.define("Lamp", lamp).is_ok());
    }

    #[test]
    fn test_destroyed_engine_rejects_work() {
        let _lock = exclusive();
        let mut engine = Engine::new().unwrap();
        let ctx = engine.new_context().unwrap();
        engine.destroy();
        assert_eq!(engine.new_context().unwrap_err(), EngineError::Destroyed);
        assert_eq!(
            engine.define("Lamp", lamp).unwrap_err(),
            ReceiverError::Engine(EngineError::Destroyed)
        );
        assert!(matches!(
            ctx.eval("return 1;"),
            Err(crate::ContextError::Destroyed)
        ));
    }
}
