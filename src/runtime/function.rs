//! Function objects and compiled scope metadata
//!
//! Compilation itself happens elsewhere; this module only holds what the
//! context layer needs from a compiled function:
//! - the names and kinds of the bindings stored inline in a context
//! - the number of lexical slots that start in the temporal dead zone
//! - the metadata of each nested block scope, addressed by block index
//!
//! A function object on the heap is two words:
//! ```text
//! [scope, info]    scope: captured context (or null), info: FunctionId
//! ```

use crate::gc::{Heap, HeapRef, MemoryTag, Tracer};
use crate::runtime::Atom;
use crate::value::Value;

/// Kind of an inline binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `var` or hoisted function; never in the temporal dead zone
    Var,
    /// `let`, including catch parameters
    Let,
    /// `const`
    Const,
}

impl BindingKind {
    #[inline]
    pub fn is_lexical(self) -> bool {
        !matches!(self, BindingKind::Var)
    }
}

/// A declared local binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: Atom,
    pub kind: BindingKind,
}

impl LocalDecl {
    pub fn var(name: Atom) -> Self {
        LocalDecl {
            name,
            kind: BindingKind::Var,
        }
    }

    pub fn let_(name: Atom) -> Self {
        LocalDecl {
            name,
            kind: BindingKind::Let,
        }
    }

    pub fn const_(name: Atom) -> Self {
        LocalDecl {
            name,
            kind: BindingKind::Const,
        }
    }
}

/// Index of a [`ScopeInfo`] in the engine's scope table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Index of a [`FunctionInfo`] in the engine's function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Inline binding layout of one function or block scope
///
/// Locals are ordered so the lexical ones form a suffix: the last
/// `size_of_local_temporal_dead_zone()` local slots start out empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeInfo {
    formals: Vec<Atom>,
    locals: Vec<LocalDecl>,
    tdz: usize,
}

impl ScopeInfo {
    /// Build the layout for the given formals and declared locals
    ///
    /// `var` locals are moved in front of lexical ones (keeping their relative
    /// order). A `var` that repeats a formal name is the formal itself and gets
    /// no slot of its own.
    pub fn new(formals: Vec<Atom>, locals: Vec<LocalDecl>) -> Self {
        let (vars, lexicals): (Vec<_>, Vec<_>) =
            locals.into_iter().partition(|decl| !decl.kind.is_lexical());
        let mut ordered: Vec<LocalDecl> = Vec::with_capacity(vars.len() + lexicals.len());
        for decl in vars {
            if !formals.contains(&decl.name) && !ordered.iter().any(|d| d.name == decl.name) {
                ordered.push(decl);
            }
        }
        let tdz = lexicals.len();
        ordered.extend(lexicals);
        ScopeInfo {
            formals,
            locals: ordered,
            tdz,
        }
    }

    /// Layout of a block scope (no formals)
    pub fn block(locals: Vec<LocalDecl>) -> Self {
        Self::new(Vec::new(), locals)
    }

    #[inline]
    pub fn n_formals(&self) -> usize {
        self.formals.len()
    }

    #[inline]
    pub fn n_locals(&self) -> usize {
        self.locals.len()
    }

    /// Number of trailing local slots initialized to `empty`
    #[inline]
    pub fn size_of_local_temporal_dead_zone(&self) -> usize {
        self.tdz
    }

    pub fn local(&self, index: usize) -> Option<&LocalDecl> {
        self.locals.get(index)
    }

    pub fn locals(&self) -> &[LocalDecl] {
        &self.locals
    }

    pub fn formals(&self) -> &[Atom] {
        &self.formals
    }

    /// Find a declared local by name
    pub fn local_index(&self, name: Atom) -> Option<usize> {
        self.locals.iter().position(|decl| decl.name == name)
    }

    /// Find a formal by name; the last of duplicated formals wins
    pub fn formal_index(&self, name: Atom) -> Option<usize> {
        self.formals.iter().rposition(|&formal| formal == name)
    }
}

/// Compiler output consumed by [`Engine::register_function`]
///
/// [`Engine::register_function`]: crate::Engine::register_function
#[derive(Debug, Clone, Default)]
pub struct CompiledFunction {
    pub name: Option<Atom>,
    pub strict: bool,
    pub scope: ScopeInfo,
    pub blocks: Vec<ScopeInfo>,
}

/// Registered function metadata
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: Option<Atom>,
    pub strict: bool,
    pub scope: ScopeId,
    pub blocks: Vec<ScopeId>,
}

/// Word holding the captured scope
const SCOPE: usize = 0;
/// Word holding the function id
const INFO: usize = 1;
/// Data words of a function block
pub(crate) const FUNCTION_WORDS: usize = 2;

/// Reference to a function object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef(HeapRef);

impl FunctionRef {
    /// Initialize a freshly allocated function block
    pub(crate) fn init(heap: &mut Heap, r: HeapRef, id: FunctionId, scope: Value) -> Self {
        heap.init_value(r, SCOPE, scope);
        heap.set_word(r, INFO, id.0 as usize);
        FunctionRef(r)
    }

    /// View `value` as a function if it references a function block
    pub fn from_value(heap: &Heap, value: Value) -> Option<FunctionRef> {
        let r = value.to_ref()?;
        (heap.is_valid_ref(r) && heap.tag(r) == MemoryTag::Function).then_some(FunctionRef(r))
    }

    #[inline]
    pub fn heap_ref(self) -> HeapRef {
        self.0
    }

    #[inline]
    pub fn to_value(self) -> Value {
        Value::from_ref(self.0)
    }

    /// The context captured when the function was created
    pub fn scope(self, heap: &Heap) -> Value {
        heap.value(self.0, SCOPE)
    }

    pub fn id(self, heap: &Heap) -> FunctionId {
        FunctionId(heap.word(self.0, INFO) as u32)
    }
}

/// Trace callback for `MemoryTag::Function`
pub(crate) fn mark_function(heap: &Heap, r: HeapRef, tracer: &mut Tracer) {
    tracer.trace_value(heap.value(r, SCOPE));
}
