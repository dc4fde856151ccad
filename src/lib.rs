//! jsscope - execution contexts and scope chains for a garbage-collected
//! script runtime
//!
//! Scopes are heap blocks with a fixed header (outer, activation, type)
//! that a non-type-aware mark-sweep collector traces by word offset. Call
//! and block scopes store their locals and arguments inline, after the
//! header, in the same block.
//!
//! # Features
//! - Global, `with`, QML, block, catch and call contexts
//! - Lookup, assignment and deletion along the scope chain
//! - Temporal dead zone for `let`/`const` bindings
//! - Per-iteration copies of block scopes
//! - Incremental marking with an insertion write barrier
//!
//! # Example
//! ```
//! use jsscope::runtime::{CompiledFunction, LocalDecl, ScopeInfo};
//! use jsscope::{Engine, EngineConfig, Value};
//!
//! let mut engine = Engine::new(EngineConfig::default()).unwrap();
//! let x = engine.intern("x");
//! let id = engine.register_function(CompiledFunction {
//!     scope: ScopeInfo::new(vec![], vec![LocalDecl::let_(x)]),
//!     ..Default::default()
//! });
//! let global = engine.global_context();
//! let f = engine.new_function(id, global).unwrap();
//! let frame = engine.enter_function(f, vec![]).unwrap();
//!
//! assert!(engine.get_property(frame.context(), x).is_err());
//! engine.set_property(frame.context(), x, Value::int(5)).unwrap();
//! assert_eq!(engine.get_property(frame.context(), x), Ok(Value::int(5)));
//! ```

// Core modules
pub mod value;
pub mod engine;
pub mod error;

// Garbage collector
pub mod gc;

// Execution contexts
pub mod context;

// Runtime support
pub mod runtime;

// Interpreter surface
pub mod vm;

// Re-export main types
pub use context::{Binding, CallContextRef, ContextRef, ContextType, InlineScope};
pub use engine::{Engine, EngineConfig, MemoryStats};
pub use error::{ContextError, ErrorKind, Result};
pub use gc::GcStats;
pub use value::Value;
