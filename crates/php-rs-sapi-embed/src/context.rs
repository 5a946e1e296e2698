//! One script execution sandbox.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use php_rs_vm::{ContextId, Vm};
use serde::Serialize;

use crate::engine::{EngineInner, Sink};
use crate::error::ContextError;
use crate::headers::Headers;
use crate::value::Value;

/// An execution context created by [`Engine::new_context`](crate::Engine::new_context).
///
/// Each context has its own global variables, INI settings, output and log
/// sinks, and response headers. Values bound into it or returned from
/// [`Context::eval`] are released when the context is destroyed.
pub struct Context {
    id: ContextId,
    engine: Rc<EngineInner>,
    vm: Rc<RefCell<Option<Vm>>>,
    headers: Rc<RefCell<Headers>>,
    destroyed: bool,
}

impl Context {
    pub(crate) fn new(
        id: ContextId,
        engine: Rc<EngineInner>,
        vm: Rc<RefCell<Option<Vm>>>,
        headers: Rc<RefCell<Headers>>,
    ) -> Self {
        Self {
            id,
            engine,
            vm,
            headers,
            destroyed: false,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    fn ensure_live(&self) -> Result<(), ContextError> {
        if self.destroyed || self.engine.is_destroyed() {
            return Err(ContextError::Destroyed);
        }
        Ok(())
    }

    fn with_vm<R>(&self, f: impl FnOnce(&mut Vm) -> R) -> Result<R, ContextError> {
        self.ensure_live()?;
        let mut guard = self.vm.try_borrow_mut().map_err(|_| ContextError::Busy)?;
        let vm = guard.as_mut().ok_or(ContextError::Destroyed)?;
        Ok(f(vm))
    }

    fn track(&self, value: &Value) {
        self.engine
            .with_context(self.id, |slot| slot.values.push(value.share()));
    }

    /// Define global variable `$name` with the converted `value`. Nothing is
    /// bound if the conversion fails.
    pub fn bind<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), ContextError> {
        self.ensure_live()?;
        let value = Value::new(value)?;
        let zval = value.zval().unwrap_or_default();
        self.with_vm(|vm| vm.set_global(name, zval))?;
        self.track(&value);
        Ok(())
    }

    /// Run a script file. Output, diagnostics and headers go to this
    /// context's sinks.
    pub fn exec(&self, path: impl AsRef<Path>) -> Result<(), ContextError> {
        self.ensure_live()?;
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ContextError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path.to_string_lossy();
        self.with_vm(|vm| vm.execute_file(&name, &source))??;
        Ok(())
    }

    /// Run inline code (without an opening tag) as the body of an
    /// immediately invoked function. `return expr;` yields that value;
    /// anything else yields null.
    ///
    /// The function starts with a copy of the globals, so assignments stay
    /// local to this call unless declared `global`.
    ///
    /// ```no_run
    /// use php_rs_sapi_embed::Engine;
    ///
    /// let engine = Engine::new().unwrap();
    /// let ctx = engine.new_context().unwrap();
    /// let value = ctx.eval("$i = 10; $d = 20; return $i + $d;").unwrap();
    /// assert_eq!(value.int(), 30);
    /// ```
    pub fn eval(&self, script: &str) -> Result<Value, ContextError> {
        let zval = self.with_vm(|vm| vm.eval(script))??;
        let value = Value::from_zval(zval);
        self.track(&value);
        Ok(value)
    }

    /// Set an INI directive for this context only.
    pub fn ini(&self, name: &str, value: &str) -> Result<(), ContextError> {
        self.with_vm(|vm| vm.ini_set(name, value))
    }

    /// Current value of an INI directive.
    pub fn ini_get(&self, name: &str) -> Result<String, ContextError> {
        self.with_vm(|vm| vm.ini().get(name).to_string())
    }

    /// Current value of global `$name`, if set.
    pub fn global(&self, name: &str) -> Result<Option<Value>, ContextError> {
        let zval = self.with_vm(|vm| vm.global(name).cloned())?;
        Ok(zval.map(|zval| {
            let value = Value::from_zval(zval);
            self.track(&value);
            value
        }))
    }

    /// Send script output to `sink`. Without a sink output is discarded.
    pub fn set_output(&mut self, sink: Sink) {
        self.engine.with_context(self.id, |slot| slot.output = Some(sink));
    }

    /// Send log lines to `sink`. Without a sink they are discarded.
    pub fn set_log(&mut self, sink: Sink) {
        self.engine.with_context(self.id, |slot| slot.log = Some(sink));
    }

    /// Headers set by scripts so far.
    pub fn headers(&self) -> Headers {
        self.headers.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed || self.engine.is_destroyed()
    }

    /// Release the context's values and receiver instances, then the VM.
    /// Safe to call more than once; also runs on drop.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.engine.remove_context(self.id).finish();
        if let Ok(mut vm) = self.vm.try_borrow_mut() {
            vm.take();
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
