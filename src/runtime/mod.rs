//! Runtime support
//!
//! The collaborators the scope chain is built on:
//! - Interned names (Atom, AtomTable)
//! - Property-bearing objects used as activations
//! - Function objects and compiled scope metadata

pub mod function;
pub mod object;
pub mod string;

pub use function::{
    BindingKind, CompiledFunction, FunctionId, FunctionInfo, FunctionRef, LocalDecl, ScopeId,
    ScopeInfo,
};
pub use object::{ObjectRef, PropertyAttributes};
pub use string::{Atom, AtomTable};
