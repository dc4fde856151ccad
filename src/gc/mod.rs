//! Garbage collector module
//!
//! The heap is a word arena traced by a non-moving mark-sweep collector.
//! The collector is not type-aware: each memory tag registers a trace
//! callback that reports the reference-valued words of its blocks.
//!
//! Benefits of tracing GC:
//! - Smaller object headers (no reference count)
//! - Handles cycles automatically (a closure stored in the scope that created it)

mod allocator;
mod collector;

pub use allocator::{BlockHeader, BlockIterator, Heap, HeapRef, MemoryTag};
pub use collector::{GcPhase, GcStats, MarkFn, Tracer, mark_value_array};

impl Heap {
    /// Run a full collection from the given roots
    pub fn collect(&mut self, roots: &[crate::value::Value]) -> GcStats {
        collector::collect(self, roots)
    }

    /// Begin incremental marking from the given roots
    pub fn start_marking(&mut self, roots: &[crate::value::Value]) {
        collector::start(self, roots);
    }

    /// Scan at most `budget` gray blocks; true when marking work is exhausted
    pub fn mark_step(&mut self, budget: usize) -> bool {
        collector::step(self, budget)
    }

    /// Finish marking (re-shading the roots) and sweep
    pub fn finish_collection(&mut self, roots: &[crate::value::Value]) -> GcStats {
        collector::finish(self, roots)
    }
}
