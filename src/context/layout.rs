//! Heap layout of execution contexts
//!
//! Every context block starts with the same header; Call and Block contexts
//! extend it with a function reference, metadata and a trailing slot array:
//!
//! ```text
//! word  0  outer        \ ExecutionContextData   (traced)
//! word  1  activation   /
//! word  2  type | nArgs   ContextMeta            (not traced)
//! ---------------------------------------------- all variants end here
//! word  3  function       CallContextData        (traced)
//! word  4  scope        \
//! word  5  locals.size   > CallContextMeta       (not traced)
//! word  6  locals.alloc /
//! word  7  slot[0]      \
//!  ...                   > alloc slots: locals, then arguments (traced)
//! ```
//!
//! The structs below are `#[repr(C)]` views of those words. They are never
//! placed on the heap as such; the word offsets used by the accessors are
//! computed from them and checked at compile time.

use core::mem::{offset_of, size_of};

use super::ContextType;
use crate::gc::{Heap, HeapRef};
use crate::value::{Value, WORD_SIZE};

/// Pointer-bearing part of the shared header
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContextData {
    pub outer: Value,
    pub activation: Value,
}

/// Context type and argument count packed in one word
///
/// Bits 0-7 hold the type, bits 8-31 the argument count.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMeta {
    pub bits: usize,
}

impl ContextMeta {
    const TYPE_BITS: u32 = 8;
    const NARGS_MASK: usize = (1 << 24) - 1;

    /// `n_args` is masked to 24 bits; callers reject larger counts first.
    pub const fn new(ty: ContextType, n_args: usize) -> Self {
        ContextMeta {
            bits: (ty as usize) | ((n_args & Self::NARGS_MASK) << Self::TYPE_BITS),
        }
    }

    pub const fn context_type(self) -> Option<ContextType> {
        ContextType::from_bits((self.bits & 0xff) as u8)
    }

    pub const fn n_args(self) -> usize {
        (self.bits >> Self::TYPE_BITS) & Self::NARGS_MASK
    }
}

/// Header shared by all variants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub data: ExecutionContextData,
    pub meta: ContextMeta,
}

/// Pointer-bearing part added by Call and Block contexts
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContextData {
    pub function: Value,
}

/// Header of the trailing value array
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueArrayHeader {
    /// Declared locals
    pub size: usize,
    /// Locals plus argument slots
    pub alloc: usize,
}

/// Non-pointer part added by Call and Block contexts
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContextMeta {
    /// Scope metadata id naming the inline bindings
    pub scope: usize,
    pub locals: ValueArrayHeader,
}

/// Fixed part of a Call or Block context; the slot array follows it
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub base: ExecutionContext,
    pub data: CallContextData,
    pub meta: CallContextMeta,
}

const fn words(bytes: usize) -> usize {
    bytes / WORD_SIZE
}

pub const OUTER: usize = words(
    offset_of!(ExecutionContext, data) + offset_of!(ExecutionContextData, outer),
);
pub const ACTIVATION: usize = words(
    offset_of!(ExecutionContext, data) + offset_of!(ExecutionContextData, activation),
);
pub const META: usize = words(offset_of!(ExecutionContext, meta));
/// Size of a Global, With or QML context
pub const HEADER_WORDS: usize = words(size_of::<ExecutionContext>());

pub const FUNCTION: usize =
    words(offset_of!(CallContext, data) + offset_of!(CallContextData, function));
pub const SCOPE: usize = words(offset_of!(CallContext, meta) + offset_of!(CallContextMeta, scope));
pub const LOCALS_SIZE: usize = words(
    offset_of!(CallContext, meta)
        + offset_of!(CallContextMeta, locals)
        + offset_of!(ValueArrayHeader, size),
);
pub const LOCALS_ALLOC: usize = words(
    offset_of!(CallContext, meta)
        + offset_of!(CallContextMeta, locals)
        + offset_of!(ValueArrayHeader, alloc),
);
/// First trailing slot
pub const SLOTS: usize = words(size_of::<CallContext>());

/// Block size in words of a Call or Block context with `alloc` slots
#[inline]
pub const fn call_context_words(alloc: usize) -> usize {
    SLOTS + alloc
}

const _: () = {
    // Traced header words come first and are contiguous
    assert!(offset_of!(ExecutionContext, data) == 0);
    assert!(offset_of!(ExecutionContextData, outer) == 0);
    assert!(offset_of!(ExecutionContextData, activation) == WORD_SIZE);
    assert!(size_of::<ExecutionContextData>() == 2 * WORD_SIZE);
    assert!(size_of::<ContextMeta>() == WORD_SIZE);
    assert!(
        size_of::<ExecutionContext>()
            == size_of::<ExecutionContextData>() + size_of::<ContextMeta>()
    );

    // The derived pointer follows the inherited header directly
    assert!(offset_of!(CallContext, base) == 0);
    assert!(offset_of!(CallContextData, function) == 0);
    assert!(offset_of!(CallContext, data) == size_of::<ExecutionContext>());
    assert!(
        offset_of!(CallContext, meta)
            == size_of::<ExecutionContext>() + size_of::<CallContextData>()
    );
    assert!(
        size_of::<CallContext>()
            == size_of::<ExecutionContext>()
                + size_of::<CallContextData>()
                + size_of::<CallContextMeta>()
    );

    // Every view is a whole number of words
    assert!(size_of::<ExecutionContextData>() % WORD_SIZE == 0);
    assert!(size_of::<ExecutionContext>() % WORD_SIZE == 0);
    assert!(size_of::<CallContextData>() % WORD_SIZE == 0);
    assert!(size_of::<CallContextMeta>() % WORD_SIZE == 0);
    assert!(size_of::<CallContext>() % WORD_SIZE == 0);
    assert!(size_of::<Value>() == WORD_SIZE);

    assert!(OUTER == 0 && ACTIVATION == 1 && META == 2);
    assert!(FUNCTION == HEADER_WORDS);
    assert!(SLOTS == FUNCTION + 4);
};

impl ExecutionContext {
    /// Snapshot the header of context block `r`
    pub fn read(heap: &Heap, r: HeapRef) -> Self {
        ExecutionContext {
            data: ExecutionContextData {
                outer: heap.value(r, OUTER),
                activation: heap.value(r, ACTIVATION),
            },
            meta: ContextMeta {
                bits: heap.word(r, META),
            },
        }
    }
}

impl CallContext {
    /// Snapshot the fixed part of Call or Block context block `r`
    pub fn read(heap: &Heap, r: HeapRef) -> Self {
        CallContext {
            base: ExecutionContext::read(heap, r),
            data: CallContextData {
                function: heap.value(r, FUNCTION),
            },
            meta: CallContextMeta {
                scope: heap.word(r, SCOPE),
                locals: ValueArrayHeader {
                    size: heap.word(r, LOCALS_SIZE),
                    alloc: heap.word(r, LOCALS_ALLOC),
                },
            },
        }
    }
}

/// Write the shared header of a fresh, unreachable block
pub(crate) fn init_header(
    heap: &mut Heap,
    r: HeapRef,
    ty: ContextType,
    outer: Value,
    activation: Value,
    n_args: usize,
) {
    heap.init_value(r, OUTER, outer);
    heap.init_value(r, ACTIVATION, activation);
    heap.set_word(r, META, ContextMeta::new(ty, n_args).bits);
}

/// Write the Call/Block part of a fresh, unreachable block
pub(crate) fn init_inline_header(
    heap: &mut Heap,
    r: HeapRef,
    function: Value,
    scope: usize,
    size: usize,
    alloc: usize,
) {
    heap.init_value(r, FUNCTION, function);
    heap.set_word(r, SCOPE, scope);
    heap.set_word(r, LOCALS_SIZE, size);
    heap.set_word(r, LOCALS_ALLOC, alloc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::MemoryTag;

    #[test]
    fn test_word_offsets() {
        assert_eq!(OUTER, 0);
        assert_eq!(ACTIVATION, 1);
        assert_eq!(META, 2);
        assert_eq!(HEADER_WORDS, 3);
        assert_eq!(FUNCTION, 3);
        assert_eq!(SCOPE, 4);
        assert_eq!(LOCALS_SIZE, 5);
        assert_eq!(LOCALS_ALLOC, 6);
        assert_eq!(SLOTS, 7);
        assert_eq!(call_context_words(3), 10);
    }

    #[test]
    fn test_meta_packing() {
        let meta = ContextMeta::new(ContextType::Call, 300);
        assert_eq!(meta.context_type(), Some(ContextType::Call));
        assert_eq!(meta.n_args(), 300);

        let meta = ContextMeta::new(ContextType::With, 0);
        assert_eq!(meta.context_type(), Some(ContextType::With));
        assert_eq!(meta.n_args(), 0);

        assert_eq!(ContextMeta { bits: 0 }.context_type(), None);
    }

    #[test]
    fn test_read_views() {
        let mut heap = Heap::new(4096);
        let r = heap.alloc(call_context_words(2), MemoryTag::Context).unwrap();
        init_header(&mut heap, r, ContextType::Block, Value::null(), Value::null(), 0);
        init_inline_header(&mut heap, r, Value::undefined(), 9, 2, 2);

        let view = CallContext::read(&heap, r);
        assert_eq!(view.base.data.outer, Value::null());
        assert_eq!(view.base.meta.context_type(), Some(ContextType::Block));
        assert_eq!(view.data.function, Value::undefined());
        assert_eq!(view.meta.scope, 9);
        assert_eq!(view.meta.locals, ValueArrayHeader { size: 2, alloc: 2 });
    }
}
