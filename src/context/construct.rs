//! Context construction
//!
//! Every constructor allocates the complete block, writes the header and
//! the temporal dead zone markers, and only then hands out a reference.
//! Values held outside the heap (frame contents, constructor arguments) are
//! rooted for the duration of the allocation.

use super::layout::{
    ACTIVATION, HEADER_WORDS, OUTER, SLOTS, call_context_words, init_header, init_inline_header,
};
use super::{ContextRef, ContextType, InlineScope};
use crate::engine::Engine;
use crate::error::{ContextError, Result};
use crate::gc::{HeapRef, MemoryTag};
use crate::runtime::{Atom, ObjectRef, ScopeId};
use crate::value::Value;
use crate::vm::{Frame, MAX_ARGS};

impl Engine {
    /// Create the activation context for the function running in `frame`
    ///
    /// Slots are `n_locals + max(argc, n_formals)`: declared locals first,
    /// then the arguments, then `undefined` for formals the caller omitted.
    /// Extra arguments beyond the formals stay in the slot array. The outer
    /// context is the scope the function captured, not the caller's context.
    ///
    /// The header stores the argument count in 24 bits, so a frame with more
    /// than [`MAX_ARGS`] arguments is rejected with a range error.
    pub fn new_call_context(&mut self, frame: &Frame) -> Result<ContextRef> {
        let argc = frame.argc();
        check_arg_count(argc)?;
        let function = frame.function();
        let scope_id = self.function_info(function.id(&self.heap)).scope;
        let (n_locals, n_formals, tdz) = self.scope_shape(scope_id);
        let alloc = n_locals + argc.max(n_formals);

        let r = self.alloc_rooted(
            MemoryTag::Context,
            call_context_words(alloc),
            &frame.roots(),
        )?;

        let outer = function.scope(&self.heap);
        init_header(&mut self.heap, r, ContextType::Call, outer, Value::null(), argc);
        init_inline_header(
            &mut self.heap,
            r,
            function.to_value(),
            scope_id.0 as usize,
            n_locals,
            alloc,
        );
        self.init_locals(r, n_locals, tdz);
        for (i, &arg) in frame.args().iter().enumerate() {
            self.heap.init_value(r, SLOTS + n_locals + i, arg);
        }
        for i in n_locals + argc..alloc {
            self.heap.init_value(r, SLOTS + i, Value::undefined());
        }

        tracing::debug!(n_locals, argc, n_formals, tdz, "new call context");
        Ok(ContextRef::from_heap_ref(r))
    }

    /// Create the context of block `block_index` of the frame's function
    ///
    /// The block is nested in the frame's current context.
    pub fn new_block_context(&mut self, frame: &Frame, block_index: usize) -> Result<ContextRef> {
        let scope_id = self.function_info(frame.function().id(&self.heap)).blocks[block_index];
        let (n_locals, _, tdz) = self.scope_shape(scope_id);

        let r = self.alloc_rooted(
            MemoryTag::Context,
            call_context_words(n_locals),
            &frame.roots(),
        )?;

        init_header(
            &mut self.heap,
            r,
            ContextType::Block,
            frame.context().to_value(),
            Value::null(),
            0,
        );
        init_inline_header(
            &mut self.heap,
            r,
            frame.function().to_value(),
            scope_id.0 as usize,
            n_locals,
            n_locals,
        );
        self.init_locals(r, n_locals, tdz);

        tracing::debug!(block_index, n_locals, tdz, "new block context");
        Ok(ContextRef::from_heap_ref(r))
    }

    /// Copy a block context for the next loop iteration
    ///
    /// The copy has the same size, header and slot values as `ctx`; later
    /// writes to either are independent.
    pub fn clone_block_context(&mut self, ctx: ContextRef) -> Result<ContextRef> {
        debug_assert_eq!(ctx.context_type(&self.heap), ContextType::Block);
        let words = self.heap.size_words(ctx.heap_ref());
        let r = self.alloc_rooted(MemoryTag::Context, words, &[ctx.to_value()])?;
        // A block allocated during marking is gray, so its copied words are
        // scanned before the cycle ends.
        self.heap.copy_block(ctx.heap_ref(), r);

        tracing::debug!(words, "cloned block context");
        Ok(ContextRef::from_heap_ref(r))
    }

    /// Create a `with` scope whose bindings are the properties of `object`
    pub fn new_with_context(&mut self, outer: ContextRef, object: ObjectRef) -> Result<ContextRef> {
        self.new_object_context(ContextType::With, outer, object)
    }

    /// Create a QML scope backed by `scope_object`
    ///
    /// Lookups treat it like a `with` scope, but deletes pass through it and
    /// `var` bindings created below it land on its scope object.
    pub fn new_qml_context(
        &mut self,
        outer: ContextRef,
        scope_object: ObjectRef,
    ) -> Result<ContextRef> {
        self.new_object_context(ContextType::QmlContext, outer, scope_object)
    }

    fn new_object_context(
        &mut self,
        ty: ContextType,
        outer: ContextRef,
        object: ObjectRef,
    ) -> Result<ContextRef> {
        let r = self.alloc_rooted(
            MemoryTag::Context,
            HEADER_WORDS,
            &[outer.to_value(), object.to_value()],
        )?;
        init_header(&mut self.heap, r, ty, Value::null(), Value::null(), 0);
        // Linked after initialization, through the barrier.
        self.heap.write_value(r, OUTER, outer.to_value());
        self.heap.write_value(r, ACTIVATION, object.to_value());

        tracing::debug!(?ty, "new object context");
        Ok(ContextRef::from_heap_ref(r))
    }

    /// Create the scope of a `catch` clause
    ///
    /// A block context for `block_index` whose binding `name` holds the
    /// pending exception, which is consumed.
    pub fn new_catch_context(
        &mut self,
        frame: &Frame,
        block_index: usize,
        name: Atom,
    ) -> Result<ContextRef> {
        // The exception stays pending (and rooted) until the block exists.
        let ctx = self.new_block_context(frame, block_index)?;
        let exception = self.catch_exception();

        let scope = InlineScope(ctx.heap_ref());
        let info = self.scope_info(scope.scope_id(&self.heap));
        match info.local_index(name) {
            Some(index) => scope.set_slot(&mut self.heap, index, exception),
            None => {
                let mark = self.root_mark();
                self.push_root(ctx.to_value());
                self.push_root(exception);
                let result = self.set_property(ctx, name, exception);
                self.release_roots(mark);
                result?;
            }
        }

        tracing::debug!(name = self.atom_name(name), "new catch context");
        Ok(ctx)
    }

    /// Locals, formals and TDZ size of a scope
    fn scope_shape(&self, id: ScopeId) -> (usize, usize, usize) {
        let info = self.scope_info(id);
        (
            info.n_locals(),
            info.n_formals(),
            info.size_of_local_temporal_dead_zone(),
        )
    }

    /// `undefined` for `var` locals, `empty` for the lexical suffix
    fn init_locals(&mut self, r: HeapRef, n_locals: usize, tdz: usize) {
        let first_tdz = n_locals - tdz;
        for i in 0..n_locals {
            let value = if i < first_tdz {
                Value::undefined()
            } else {
                Value::empty()
            };
            self.heap.init_value(r, SLOTS + i, value);
        }
    }
}

fn check_arg_count(argc: usize) -> Result<()> {
    if argc > MAX_ARGS {
        return Err(ContextError::Range(format!(
            "too many arguments: {} (limit {})",
            argc, MAX_ARGS
        )));
    }
    Ok(())
}
