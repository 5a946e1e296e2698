//! PHP Embed SAPI: run PHP scripts inside a Rust application.
//!
//! Equivalent to php-src/sapi/embed/
//!
//! - [`Engine`] owns the runtime. One may be active per process.
//! - [`Context`] is one sandbox with its own globals, sinks and headers.
//!   Host values go in with [`Context::bind`]; [`Context::eval`] hands
//!   results back as [`Value`]s.
//! - [`Engine::define`] exposes a host type implementing [`Exported`] as a
//!   PHP class.
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use php_rs_sapi_embed::Engine;
//!
//! let engine = Engine::new().unwrap();
//! let mut ctx = engine.new_context().unwrap();
//! let out = Rc::new(RefCell::new(Vec::<u8>::new()));
//! ctx.set_output(out.clone());
//!
//! ctx.bind("x", &42).unwrap();
//! ctx.eval("echo serialize($x);").unwrap();
//! assert_eq!(&*out.borrow(), b"i:42;");
//! ```

mod context;
mod convert;
mod engine;
mod error;
mod headers;
mod host;
mod receiver;
mod value;

pub use context::Context;
pub use convert::to_zval;
pub use engine::{Engine, EngineConfig, Sink, EMBED_INI};
pub use error::{ContextError, ConversionError, EngineError, ReceiverError};
pub use headers::{canonical_name, Headers};
pub use host::HostValue;
pub use receiver::{Descriptor, Exported, Receiver, ReceiverObject, Returns};
pub use value::{Kind, Value};

pub use php_rs_vm::{ContextId, HeaderOp};
