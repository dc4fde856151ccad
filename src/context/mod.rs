//! Execution contexts
//!
//! A context is one scope of the running script. All variants share the
//! header described in [`layout`]; the `type` word decides which further
//! fields exist:
//!
//! | Variant    | activation     | inline slots    |
//! |------------|----------------|-----------------|
//! | Global     | global object  | -               |
//! | With       | wrapped object | -               |
//! | QmlContext | scope object   | -               |
//! | Block      | null           | locals          |
//! | Call       | null or lazy   | locals + args   |
//!
//! Contexts are referenced by [`ContextRef`] and never freed explicitly;
//! the collector reclaims them through [`mark_context`].

mod construct;
pub mod layout;
mod resolve;

pub use resolve::Binding;

use layout::{
    ACTIVATION, ContextMeta, FUNCTION, LOCALS_ALLOC, LOCALS_SIZE, META, OUTER, SCOPE, SLOTS,
};

use crate::gc::{Heap, HeapRef, MemoryTag, Tracer};
use crate::runtime::{FunctionRef, ObjectRef, ScopeId};
use crate::value::Value;

/// Context variant tag
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    Global = 1,
    With = 2,
    QmlContext = 3,
    Block = 4,
    Call = 5,
}

impl ContextType {
    pub const fn from_bits(bits: u8) -> Option<ContextType> {
        match bits {
            1 => Some(ContextType::Global),
            2 => Some(ContextType::With),
            3 => Some(ContextType::QmlContext),
            4 => Some(ContextType::Block),
            5 => Some(ContextType::Call),
            _ => None,
        }
    }

    /// Check if contexts of this type store bindings inline
    #[inline]
    pub const fn has_inline_slots(self) -> bool {
        matches!(self, ContextType::Block | ContextType::Call)
    }
}

/// Reference to a context block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextRef(HeapRef);

impl ContextRef {
    /// View `value` as a context if it references a context block
    pub fn from_value(heap: &Heap, value: Value) -> Option<ContextRef> {
        let r = value.to_ref()?;
        (heap.is_valid_ref(r) && heap.tag(r) == MemoryTag::Context).then_some(ContextRef(r))
    }

    #[inline]
    pub(crate) fn from_heap_ref(r: HeapRef) -> Self {
        ContextRef(r)
    }

    #[inline]
    pub fn heap_ref(self) -> HeapRef {
        self.0
    }

    #[inline]
    pub fn to_value(self) -> Value {
        Value::from_ref(self.0)
    }

    fn meta(self, heap: &Heap) -> ContextMeta {
        ContextMeta {
            bits: heap.word(self.0, META),
        }
    }

    /// Variant of this context
    pub fn context_type(self, heap: &Heap) -> ContextType {
        // Only construction writes the type word, and it always writes a valid tag.
        self.meta(heap)
            .context_type()
            .unwrap_or(ContextType::Global)
    }

    /// Enclosing context; None for the global context
    pub fn outer(self, heap: &Heap) -> Option<ContextRef> {
        heap.value(self.0, OUTER).to_ref().map(ContextRef)
    }

    pub fn activation(self, heap: &Heap) -> Option<ObjectRef> {
        ObjectRef::from_value(heap, heap.value(self.0, ACTIVATION))
    }

    /// Call-capable view; None unless this is a Call context
    pub fn as_call_context(self, heap: &Heap) -> Option<CallContextRef> {
        (self.context_type(heap) == ContextType::Call)
            .then_some(CallContextRef(InlineScope(self.0)))
    }

    /// Inline-slot view; Some for Call and Block contexts
    pub fn as_inline_scope(self, heap: &Heap) -> Option<InlineScope> {
        self.context_type(heap)
            .has_inline_slots()
            .then_some(InlineScope(self.0))
    }
}

/// View of a Call or Block context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InlineScope(HeapRef);

impl InlineScope {
    #[inline]
    pub fn context(self) -> ContextRef {
        ContextRef(self.0)
    }

    pub fn function(self, heap: &Heap) -> Option<FunctionRef> {
        FunctionRef::from_value(heap, heap.value(self.0, FUNCTION))
    }

    /// Metadata naming the inline bindings
    pub fn scope_id(self, heap: &Heap) -> ScopeId {
        ScopeId(heap.word(self.0, SCOPE) as u32)
    }

    /// Number of declared local slots
    #[inline]
    pub fn locals_size(self, heap: &Heap) -> usize {
        heap.word(self.0, LOCALS_SIZE)
    }

    /// Number of trailing slots (locals plus arguments)
    #[inline]
    pub fn locals_alloc(self, heap: &Heap) -> usize {
        heap.word(self.0, LOCALS_ALLOC)
    }

    pub fn slot(self, heap: &Heap, index: usize) -> Value {
        debug_assert!(index < self.locals_alloc(heap));
        heap.value(self.0, SLOTS + index)
    }

    /// Store into a slot of a reachable context
    pub fn set_slot(self, heap: &mut Heap, index: usize, value: Value) {
        debug_assert!(index < self.locals_alloc(heap));
        heap.write_value(self.0, SLOTS + index, value);
    }

    pub fn slots(self, heap: &Heap) -> Vec<Value> {
        (0..self.locals_alloc(heap))
            .map(|i| heap.value(self.0, SLOTS + i))
            .collect()
    }
}

/// View of a Call context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallContextRef(InlineScope);

impl CallContextRef {
    #[inline]
    pub fn context(self) -> ContextRef {
        self.0.context()
    }

    #[inline]
    pub fn inline_scope(self) -> InlineScope {
        self.0
    }

    /// Number of arguments supplied at the call site
    pub fn argc(self, heap: &Heap) -> usize {
        self.context().meta(heap).n_args()
    }

    /// Argument `index`; arguments start right after the declared locals
    pub fn arg(self, heap: &Heap, index: usize) -> Option<Value> {
        (index < self.argc(heap)).then(|| self.0.slot(heap, self.0.locals_size(heap) + index))
    }

    pub fn args(self, heap: &Heap) -> Vec<Value> {
        let base = self.0.locals_size(heap);
        (0..self.argc(heap))
            .map(|i| self.0.slot(heap, base + i))
            .collect()
    }

    pub fn function(self, heap: &Heap) -> Option<FunctionRef> {
        self.0.function(heap)
    }
}

/// Trace callback for `MemoryTag::Context`
///
/// Uses only the fixed offsets of [`layout`]: the two header pointers for
/// every variant, plus the function and each trailing slot for Call and
/// Block contexts. `empty` slots are specials and are skipped by the tracer.
pub(crate) fn mark_context(heap: &Heap, r: HeapRef, tracer: &mut Tracer) {
    tracer.trace_value(heap.value(r, OUTER));
    tracer.trace_value(heap.value(r, ACTIVATION));

    let meta = ContextMeta {
        bits: heap.word(r, META),
    };
    if meta.context_type().is_some_and(ContextType::has_inline_slots) {
        tracer.trace_value(heap.value(r, FUNCTION));
        let alloc = heap
            .word(r, LOCALS_ALLOC)
            .min(heap.size_words(r).saturating_sub(SLOTS));
        for i in 0..alloc {
            tracer.trace_value(heap.value(r, SLOTS + i));
        }
    }
}
