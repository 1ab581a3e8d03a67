//! Sable JavaScript embedding layer
//!
//! Lets host code create, inspect, mutate and invoke values living inside an
//! embedded ECMAScript engine, and move exceptions across the boundary in
//! both directions.
//!
//! # Architecture
//!
//! The crate is organized into:
//!
//! - `value`: guest value handles and property keys
//! - `object`: heap cells and the host-visible object descriptor
//! - `heap`: per-session arena, released in bulk on destroy
//! - `handle`: factories, strict accessors, `typeof` and `instanceof`
//! - `coerce`: guest coercions and equality
//! - `store`: property access, array semantics and prototype links
//! - `bridge`: host callbacks, `call` and `new`
//! - `exception`: guest Error objects and the host/guest error channel
//! - `session`: session lifecycle, `run` and `destroy`
//! - `engine`: the compile/execute seam and the opaque bytecode blob
//! - `builtins`: the global object and standard constructors
//! - `script`: the bundled tree-walking engine
//!
//! # Usage
//!
//! ```no_run
//! use sable_js::{Value, VmSession};
//!
//! # fn main() -> sable_js::Result<()> {
//! let mut vm = VmSession::new()?;
//! let global = vm.get_global()?;
//! let log = vm.create_function("log", |vm, _this, args| {
//!     let line = args
//!         .iter()
//!         .map(|a| vm.to_display_string(a))
//!         .collect::<Result<Vec<_>, _>>()?
//!         .join(" ");
//!     println!("{}", line);
//!     Ok(Value::Undefined)
//! })?;
//! vm.set_property(&global, "log", log)?;
//!
//! let code = vm.compile("log('hello', 1 + 2)")?;
//! vm.run(&code)?;
//! vm.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod builtins;
pub mod coerce;
pub mod engine;
pub mod error;
pub mod exception;
pub mod handle;
pub mod heap;
pub mod object;
pub mod script;
pub mod session;
pub mod store;
pub mod value;

pub use bridge::BuiltinFn;
pub use engine::{Bytecode, Engine, GuestCode};
pub use error::{GuestException, HostError, HostResult, Result, VmError};
pub use exception::ErrorKind;
pub use object::{InternalSlot, ObjectDescriptor};
pub use script::ScriptEngine;
pub use session::{SessionConfig, SessionState, SharedSession, VmSession};
pub use value::{ObjectRef, PropertyKey, Tag, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
