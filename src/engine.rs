//! Script engine instance
//!
//! The Engine owns the heap and everything the scope chain needs around it:
//! interned names, compiled scope metadata, the global context and its
//! activation object, the pending exception and the root stack. All context
//! operations are methods on it; there is no process-wide state.

use crate::context::layout::{HEADER_WORDS, init_header};
use crate::context::{ContextRef, ContextType, mark_context};
use crate::error::{ContextError, Result};
use crate::gc::{GcPhase, GcStats, Heap, HeapRef, MemoryTag, mark_value_array};
use crate::runtime::function::{FUNCTION_WORDS, mark_function};
use crate::runtime::object::{OBJECT_WORDS, init_object, mark_object};
use crate::runtime::{
    Atom, AtomTable, CompiledFunction, FunctionId, FunctionInfo, FunctionRef, ObjectRef, ScopeId,
    ScopeInfo,
};
use crate::value::Value;
use crate::vm::Frame;

/// Smallest accepted heap
pub const MIN_HEAP_SIZE: usize = 4096;

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Heap size in bytes
    pub heap_size: usize,
    /// Run a full collection before every allocation
    pub gc_stress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            heap_size: 64 * 1024,
            gc_stress: cfg!(feature = "debug-gc"),
        }
    }
}

impl EngineConfig {
    pub fn heap_size(mut self, bytes: usize) -> Self {
        self.heap_size = bytes;
        self
    }

    pub fn gc_stress(mut self, enabled: bool) -> Self {
        self.gc_stress = enabled;
        self
    }
}

/// Memory usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Total heap size
    pub total: usize,
    /// Bytes in live (or not yet collected) blocks
    pub heap_used: usize,
    /// Free memory available
    pub free: usize,
}

/// Script engine
pub struct Engine {
    pub(crate) heap: Heap,
    atoms: AtomTable,
    scopes: Vec<ScopeInfo>,
    functions: Vec<FunctionInfo>,
    global_context: ContextRef,
    global_object: ObjectRef,
    /// Pending exception (undefined if none)
    current_exception: Value,
    /// Values kept alive across allocations
    roots: Vec<Value>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with an empty global scope
    ///
    /// # Panics
    /// Panics if the configured heap is smaller than [`MIN_HEAP_SIZE`]
    pub fn new(config: EngineConfig) -> Result<Self> {
        assert!(
            config.heap_size >= MIN_HEAP_SIZE,
            "Heap size must be at least {} bytes",
            MIN_HEAP_SIZE
        );

        let mut heap = Heap::new(config.heap_size);
        heap.register_mark(MemoryTag::Object, mark_object);
        heap.register_mark(MemoryTag::Function, mark_function);
        heap.register_mark(MemoryTag::Context, mark_context);
        heap.register_mark(MemoryTag::ValueArray, mark_value_array);

        // Nothing is allocated yet, so there is nothing a collection could free.
        let object = heap
            .alloc(OBJECT_WORDS, MemoryTag::Object)
            .ok_or(ContextError::OutOfMemory)?;
        let global_object = init_object(&mut heap, object);
        let context = heap
            .alloc(HEADER_WORDS, MemoryTag::Context)
            .ok_or(ContextError::OutOfMemory)?;
        init_header(
            &mut heap,
            context,
            ContextType::Global,
            Value::null(),
            global_object.to_value(),
            0,
        );

        tracing::debug!(
            heap_size = config.heap_size,
            gc_stress = config.gc_stress,
            "engine created"
        );

        Ok(Engine {
            heap,
            atoms: AtomTable::new(),
            scopes: Vec::new(),
            functions: Vec::new(),
            global_context: ContextRef::from_heap_ref(context),
            global_object,
            current_exception: Value::undefined(),
            roots: Vec::new(),
            config,
        })
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The outermost context
    #[inline]
    pub fn global_context(&self) -> ContextRef {
        self.global_context
    }

    /// Activation object of the global context
    #[inline]
    pub fn global_object(&self) -> ObjectRef {
        self.global_object
    }

    // Names

    pub fn intern(&mut self, name: &str) -> Atom {
        self.atoms.intern(name)
    }

    pub fn atom_name(&self, atom: Atom) -> &str {
        self.atoms.name(atom)
    }

    // Functions

    /// Register compiled metadata, returning the id used to create closures
    pub fn register_function(&mut self, compiled: CompiledFunction) -> FunctionId {
        let scope = self.add_scope(compiled.scope);
        let blocks = compiled
            .blocks
            .into_iter()
            .map(|block| self.add_scope(block))
            .collect();
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(FunctionInfo {
            name: compiled.name,
            strict: compiled.strict,
            scope,
            blocks,
        });
        id
    }

    fn add_scope(&mut self, scope: ScopeInfo) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    pub fn function_info(&self, id: FunctionId) -> &FunctionInfo {
        &self.functions[id.0 as usize]
    }

    pub fn scope_info(&self, id: ScopeId) -> &ScopeInfo {
        &self.scopes[id.0 as usize]
    }

    /// Declared name of `function`, if it has one
    pub fn function_name(&self, function: FunctionRef) -> Option<&str> {
        let name = self.function_info(function.id(&self.heap)).name?;
        Some(self.atom_name(name))
    }

    /// Check if `function` was compiled as strict code
    pub fn is_strict(&self, function: FunctionRef) -> bool {
        self.function_info(function.id(&self.heap)).strict
    }

    /// Create a closure of function `id` capturing `scope`
    pub fn new_function(&mut self, id: FunctionId, scope: ContextRef) -> Result<FunctionRef> {
        let r = self.alloc_rooted(MemoryTag::Function, FUNCTION_WORDS, &[scope.to_value()])?;
        Ok(FunctionRef::init(&mut self.heap, r, id, scope.to_value()))
    }

    /// Enter `function`: build its call context and return the running frame
    pub fn enter_function(&mut self, function: FunctionRef, args: Vec<Value>) -> Result<Frame> {
        let scope = ContextRef::from_value(&self.heap, function.scope(&self.heap))
            .unwrap_or(self.global_context);
        let mut frame = Frame::new(function, scope, args);
        let context = self.new_call_context(&frame)?;
        frame.set_context(context);
        tracing::trace!(
            function = self.function_name(function).unwrap_or("<anonymous>"),
            argc = frame.argc(),
            "enter function"
        );
        Ok(frame)
    }

    // Exceptions

    /// Set the pending exception
    pub fn throw(&mut self, exception: Value) {
        self.current_exception = exception;
    }

    pub fn has_exception(&self) -> bool {
        !self.current_exception.is_undefined()
    }

    pub fn exception(&self) -> Value {
        self.current_exception
    }

    /// Take the pending exception, leaving none
    pub fn catch_exception(&mut self) -> Value {
        std::mem::take(&mut self.current_exception)
    }

    // Roots

    /// Keep `value` alive until the root stack is truncated below it
    pub fn push_root(&mut self, value: Value) {
        self.roots.push(value);
    }

    /// Current height of the root stack
    pub fn root_mark(&self) -> usize {
        self.roots.len()
    }

    /// Drop roots pushed after `mark`
    pub fn release_roots(&mut self, mark: usize) {
        self.roots.truncate(mark);
    }

    /// Keep every value of `frame` alive until released
    pub fn root_frame(&mut self, frame: &Frame) -> usize {
        let mark = self.roots.len();
        self.roots.extend(frame.roots());
        mark
    }

    fn gc_roots(&self) -> Vec<Value> {
        let mut roots = Vec::with_capacity(self.roots.len() + 3);
        roots.push(self.global_context.to_value());
        roots.push(self.global_object.to_value());
        roots.push(self.current_exception);
        roots.extend_from_slice(&self.roots);
        roots
    }

    // Allocation

    /// Allocate a block, collecting if the heap is full
    pub(crate) fn alloc(&mut self, tag: MemoryTag, words: usize) -> Result<HeapRef> {
        if self.config.gc_stress && self.heap.gc_phase() == GcPhase::Idle {
            self.gc();
        }
        if let Some(r) = self.heap.alloc(words, tag) {
            return Ok(r);
        }
        tracing::debug!(?tag, words, "heap full, collecting");
        self.gc();
        self.heap.alloc(words, tag).ok_or_else(|| {
            tracing::error!(?tag, words, "out of memory");
            ContextError::OutOfMemory
        })
    }

    /// Allocate while keeping `live` reachable
    pub(crate) fn alloc_rooted(
        &mut self,
        tag: MemoryTag,
        words: usize,
        live: &[Value],
    ) -> Result<HeapRef> {
        let mark = self.roots.len();
        self.roots.extend_from_slice(live);
        let result = self.alloc(tag, words);
        self.roots.truncate(mark);
        result
    }

    // Garbage collection

    /// Run a full collection (finishing an incremental one if active)
    pub fn gc(&mut self) -> GcStats {
        let roots = self.gc_roots();
        let stats = self.heap.finish_collection(&roots);
        tracing::info!(
            freed = stats.bytes_freed,
            live = stats.objects_after,
            "collection finished"
        );
        stats
    }

    /// Begin incremental marking
    pub fn start_incremental_gc(&mut self) {
        let roots = self.gc_roots();
        self.heap.start_marking(&roots);
    }

    /// Advance incremental marking; true when only the final pause remains
    pub fn gc_step(&mut self, budget: usize) -> bool {
        self.heap.mark_step(budget)
    }

    pub fn finish_gc(&mut self) -> GcStats {
        self.gc()
    }

    pub fn gc_phase(&self) -> GcPhase {
        self.heap.gc_phase()
    }

    /// Get memory usage statistics
    pub fn memory_stats(&self) -> MemoryStats {
        let heap_used = self.heap.heap_used();
        MemoryStats {
            total: self.heap.total_size,
            heap_used,
            free: self.heap.total_size - heap_used,
        }
    }

    // Introspection

    /// Number of contexts from `ctx` to the global context, inclusive
    pub fn chain_depth(&self, ctx: ContextRef) -> usize {
        std::iter::successors(Some(ctx), |c| c.outer(&self.heap)).count()
    }

    /// Names bound directly in `ctx` (inline bindings, then activation properties)
    pub fn scope_names(&self, ctx: ContextRef) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(scope) = ctx.as_inline_scope(&self.heap) {
            let info = self.scope_info(scope.scope_id(&self.heap));
            names.extend(info.locals().iter().map(|decl| decl.name));
            if ctx.as_call_context(&self.heap).is_some() {
                names.extend(info.formals().iter().copied());
            }
        }
        if let Some(activation) = ctx.activation(&self.heap) {
            names.extend(activation.keys(&self.heap));
        }
        names
            .into_iter()
            .map(|atom| self.atom_name(atom).to_string())
            .collect()
    }

    /// Render the chain starting at `ctx`, innermost first
    #[cfg(feature = "dump")]
    pub fn dump_chain(&self, ctx: ContextRef) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let mut current = Some(ctx);
        let mut depth = 0;
        while let Some(c) = current {
            let _ = write!(out, "#{} {:?}", depth, c.context_type(&self.heap));
            if let Some(scope) = c.as_inline_scope(&self.heap) {
                let _ = write!(
                    out,
                    " size={} alloc={}",
                    scope.locals_size(&self.heap),
                    scope.locals_alloc(&self.heap)
                );
                if let Some(call) = c.as_call_context(&self.heap) {
                    let _ = write!(out, " argc={}", call.argc(&self.heap));
                }
                let _ = write!(out, " slots={:?}", scope.slots(&self.heap));
            }
            let _ = writeln!(out, " names={:?}", self.scope_names(c));
            current = c.outer(&self.heap);
            depth += 1;
        }
        out
    }
}
