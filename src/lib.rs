//! php-bridge - run PHP scripts from Rust
//!
//! This is the root package that ties the workspace together: lexer,
//! parser, runtime services and VM underneath, the embed SAPI on top. Most
//! programs only need the items re-exported here.
//!
//! ```no_run
//! use php_bridge::{Descriptor, Engine, Exported, Returns};
//!
//! struct Greeter {
//!     name: String,
//! }
//!
//! impl Exported for Greeter {
//!     fn describe(d: &mut Descriptor<Self>) {
//!         d.field_mut("Name", |g: &Greeter| g.name.clone(), |g, name| g.name = name)
//!             .method("Greet", |g, _| Returns::single(format!("Hello, {}!", g.name)));
//!     }
//! }
//!
//! let engine = Engine::new().unwrap();
//! engine
//!     .define("Greeter", |args| {
//!         let name = args.first()?.as_str()?.to_string();
//!         Some(Greeter { name })
//!     })
//!     .unwrap();
//!
//! let ctx = engine.new_context().unwrap();
//! let greeting = ctx.eval("$g = new Greeter('Doge'); return $g->Greet();").unwrap();
//! assert_eq!(greeting.string(), "Hello, Doge!");
//! ```

pub use php_rs_sapi_embed::*;

/// The VM underneath, for hosts that implement their own SAPI.
pub use php_rs_vm as vm;
