//! Mark-sweep garbage collector
//!
//! The GC works in two phases:
//! 1. Mark: shade the roots, then repeatedly pop a gray block and run the
//!    trace callback registered for its memory tag
//! 2. Sweep: turn every unmarked block into free space, coalescing neighbours
//!
//! Marking can run to completion in one call ([`collect`]) or be spread over
//! several steps ([`start`], [`step`], [`finish`]). While marking is in
//! progress the mutator must route every store of a reference into an already
//! reachable block through [`Heap::write_barrier`]; new blocks are born gray.
//! Blocks never move, so a [`HeapRef`] stays valid while its block is live.

use super::allocator::{BlockHeader, Heap, HeapRef, MemoryTag};
use crate::value::{Value, WORD_SIZE};

/// Trace callback for one memory tag
///
/// The callback reports the outgoing references of block `r` to the tracer;
/// it must not interpret words that are not values.
pub type MarkFn = fn(heap: &Heap, r: HeapRef, tracer: &mut Tracer);

/// Collects the references reported by a trace callback
#[derive(Debug, Default)]
pub struct Tracer {
    found: Vec<HeapRef>,
}

impl Tracer {
    /// Report a value; anything that is not a heap reference is ignored
    #[inline]
    pub fn trace_value(&mut self, value: Value) {
        if let Some(r) = value.to_ref() {
            self.found.push(r);
        }
    }

    #[inline]
    pub fn trace_ref(&mut self, r: HeapRef) {
        self.found.push(r);
    }
}

/// Collector phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPhase {
    #[default]
    Idle,
    Marking,
}

/// Marking state kept inside the heap so the write barrier can reach it
#[derive(Debug, Default)]
pub struct MarkState {
    phase: GcPhase,
    pub(super) worklist: Vec<HeapRef>,
}

impl MarkState {
    #[inline]
    pub(super) fn is_marking(&self) -> bool {
        self.phase == GcPhase::Marking
    }
}

/// Statistics about a GC run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of objects before collection
    pub objects_before: usize,
    /// Number of objects after collection
    pub objects_after: usize,
    /// Bytes freed
    pub bytes_freed: usize,
}

impl Heap {
    pub fn gc_phase(&self) -> GcPhase {
        self.marker.phase
    }

    /// Notify the collector that `value` was stored into a reachable block
    ///
    /// During marking the new target is shaded gray (insertion barrier), so a
    /// block that was already scanned can never hide an unmarked child.
    #[inline]
    pub fn write_barrier(&mut self, value: Value) {
        if self.marker.is_marking() {
            if let Some(r) = value.to_ref() {
                self.shade(r);
            }
        }
    }

    fn shade(&mut self, r: HeapRef) {
        if !self.is_valid_ref(r) {
            debug_assert!(false, "reference to a dead block during GC: {:?}", r);
            return;
        }
        let mut header = self.header(r);
        if header.is_marked() {
            return;
        }
        header.set_marked(true);
        self.set_header(r, header);
        self.marker.worklist.push(r);
    }
}

/// Begin an incremental collection by shading the roots
pub fn start(heap: &mut Heap, roots: &[Value]) {
    if heap.marker.is_marking() {
        return;
    }
    tracing::debug!(roots = roots.len(), "gc: start marking");
    heap.marker.phase = GcPhase::Marking;
    for &root in roots {
        heap.write_barrier(root);
    }
}

/// Scan at most `budget` gray blocks
///
/// Returns true when no gray blocks remain.
pub fn step(heap: &mut Heap, budget: usize) -> bool {
    let mut tracer = Tracer::default();
    for _ in 0..budget {
        let Some(r) = heap.marker.worklist.pop() else {
            return true;
        };
        let Some(mark) = heap.mark_table[heap.tag(r) as usize] else {
            continue;
        };
        mark(heap, r, &mut tracer);
        for child in tracer.found.drain(..) {
            heap.shade(child);
        }
    }
    heap.marker.worklist.is_empty()
}

/// Complete the current collection (starting one if needed) and sweep
///
/// Roots are shaded again because root slots are not covered by the barrier.
pub fn finish(heap: &mut Heap, roots: &[Value]) -> GcStats {
    if heap.marker.is_marking() {
        for &root in roots {
            heap.write_barrier(root);
        }
    } else {
        start(heap, roots);
    }
    while !step(heap, usize::MAX) {}
    heap.marker.phase = GcPhase::Idle;
    let stats = sweep(heap);
    tracing::debug!(
        before = stats.objects_before,
        after = stats.objects_after,
        freed = stats.bytes_freed,
        "gc: sweep done"
    );
    stats
}

/// Run a full stop-the-world collection
pub fn collect(heap: &mut Heap, roots: &[Value]) -> GcStats {
    finish(heap, roots)
}

/// Free unmarked blocks, clear marks on survivors and rebuild the free list
fn sweep(heap: &mut Heap) -> GcStats {
    let mut stats = GcStats::default();
    heap.free_list.clear();

    let mut run_start: Option<usize> = None;
    let mut offset = 0usize;
    while offset < heap.heap_ptr {
        let mut header = BlockHeader::from_bits(heap.words[offset]);
        let total = header.size_words() + 1;
        let is_object = header.tag() != MemoryTag::Free;

        if is_object {
            stats.objects_before += 1;
        }
        if is_object && header.is_marked() {
            header.set_marked(false);
            heap.words[offset] = header.bits;
            stats.objects_after += 1;
            if let Some(start) = run_start.take() {
                close_free_run(heap, start, offset);
            }
        } else {
            if is_object {
                stats.bytes_freed += total * WORD_SIZE;
                header = BlockHeader::new(MemoryTag::Free, header.size_words());
                heap.words[offset] = header.bits;
            }
            run_start.get_or_insert(offset);
        }
        offset += total;
    }

    // A free run touching the end goes back to the bump region.
    if let Some(start) = run_start {
        heap.heap_ptr = start;
    }
    stats
}

fn close_free_run(heap: &mut Heap, start: usize, end: usize) {
    heap.words[start] = BlockHeader::new(MemoryTag::Free, end - start - 1).bits;
    heap.free_list.push(start);
}

/// Trace callback for `MemoryTag::ValueArray`: every word is a value
pub fn mark_value_array(heap: &Heap, r: HeapRef, tracer: &mut Tracer) {
    for i in 0..heap.size_words(r) {
        tracer.trace_value(heap.value(r, i));
    }
}
