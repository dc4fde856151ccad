//! Arena allocator for the script heap
//!
//! Memory layout:
//! ```text
//! +------------------+  <- word 0
//! | hdr | data ...   |  block
//! | hdr | data ...   |  block (maybe Free)
//! |       ...        |
//! +------------------+  <- heap_ptr
//! |   Free space     |
//! +------------------+  <- words.len()
//! ```
//!
//! The heap is an array of words. Every block starts with a one-word header
//! holding the mark bit, the memory tag and the data size in words. Blocks are
//! addressed by [`HeapRef`], the index of their first data word, so a
//! reference stays valid for the block's whole lifetime.

use super::collector::{MarkFn, MarkState};
use crate::value::{Value, WORD_SIZE};

/// Memory block tags - stored in bits 1-3 of each block header
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTag {
    /// Free block
    Free = 0,
    /// Property-bearing object (activation objects, `with` targets)
    Object = 1,
    /// Function object: captured scope and compiled metadata id
    Function = 2,
    /// Execution context of any variant
    Context = 3,
    /// Flat array of values
    ValueArray = 4,
}

impl MemoryTag {
    pub const COUNT: usize = 5;

    #[inline]
    pub const fn from_bits(bits: u8) -> Option<MemoryTag> {
        match bits {
            0 => Some(MemoryTag::Free),
            1 => Some(MemoryTag::Object),
            2 => Some(MemoryTag::Function),
            3 => Some(MemoryTag::Context),
            4 => Some(MemoryTag::ValueArray),
            _ => None,
        }
    }
}

/// Number of bits reserved for mark bit and memory tag
const MTAG_BITS: u32 = 4;

/// Memory block header
///
/// Layout (in a single word):
/// - Bit 0: GC mark bit
/// - Bits 1-3: Memory tag
/// - Remaining bits: block size in words (excluding header)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub bits: usize,
}

impl BlockHeader {
    #[inline]
    pub const fn new(tag: MemoryTag, size_words: usize) -> Self {
        BlockHeader {
            bits: ((tag as usize) << 1) | (size_words << MTAG_BITS),
        }
    }

    #[inline]
    pub const fn from_bits(bits: usize) -> Self {
        BlockHeader { bits }
    }

    #[inline]
    pub const fn is_marked(&self) -> bool {
        (self.bits & 1) != 0
    }

    #[inline]
    pub fn set_marked(&mut self, marked: bool) {
        if marked {
            self.bits |= 1;
        } else {
            self.bits &= !1;
        }
    }

    /// Get the memory tag; unknown tag bits read as `Free`
    #[inline]
    pub const fn tag(&self) -> MemoryTag {
        match MemoryTag::from_bits(((self.bits >> 1) & 0x7) as u8) {
            Some(tag) => tag,
            None => MemoryTag::Free,
        }
    }

    /// Get the block size in words (excluding header)
    #[inline]
    pub const fn size_words(&self) -> usize {
        self.bits >> MTAG_BITS
    }

    /// Get the block size in bytes (including header)
    #[inline]
    pub const fn size_bytes(&self) -> usize {
        (self.size_words() + 1) * WORD_SIZE
    }
}

/// Reference to a heap block (index of its first data word)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct HeapRef(u32);

impl HeapRef {
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        HeapRef(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    #[inline]
    fn data(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn header(self) -> usize {
        self.0 as usize - 1
    }
}

/// The script heap
///
/// Manages block allocation; reclamation is driven by the collector.
pub struct Heap {
    /// Word storage
    pub(super) words: Vec<usize>,

    /// Total size of the heap in bytes
    pub total_size: usize,

    /// End of the allocated region, in words
    pub(super) heap_ptr: usize,

    /// Header indices of free blocks below `heap_ptr`
    pub(super) free_list: Vec<usize>,

    /// Incremental marking state
    pub(super) marker: MarkState,

    /// Per-tag trace callbacks
    pub(super) mark_table: [Option<MarkFn>; MemoryTag::COUNT],
}

impl Heap {
    /// Create a new heap with the given total size in bytes
    pub fn new(total_size: usize) -> Self {
        let n_words = total_size / WORD_SIZE;
        Heap {
            words: vec![0; n_words],
            total_size: n_words * WORD_SIZE,
            heap_ptr: 0,
            free_list: Vec::new(),
            marker: MarkState::default(),
            mark_table: [None; MemoryTag::COUNT],
        }
    }

    /// Register the trace callback the collector runs for blocks of `tag`
    pub fn register_mark(&mut self, tag: MemoryTag, mark: MarkFn) {
        self.mark_table[tag as usize] = Some(mark);
    }

    /// Bytes in blocks that are not free
    pub fn heap_used(&self) -> usize {
        self.iter_blocks()
            .filter(|(_, header)| header.tag() != MemoryTag::Free)
            .map(|(_, header)| header.size_bytes())
            .sum()
    }

    /// Bytes available to new allocations (bump region plus free blocks)
    pub fn free_space(&self) -> usize {
        self.total_size - self.heap_used()
    }

    /// Allocate a zero-initialized block of `size_words` data words
    ///
    /// Returns None if no free block or bump space fits.
    pub fn alloc(&mut self, size_words: usize, tag: MemoryTag) -> Option<HeapRef> {
        if size_words == 0 {
            return None;
        }
        let total = size_words + 1;

        // First fit from the free list
        for i in 0..self.free_list.len() {
            let h = self.free_list[i];
            let avail = BlockHeader::from_bits(self.words[h]).size_words() + 1;
            if avail >= total {
                self.free_list.swap_remove(i);
                let rest = avail - total;
                if rest > 0 {
                    self.words[h + total] = BlockHeader::new(MemoryTag::Free, rest - 1).bits;
                    self.free_list.push(h + total);
                }
                return Some(self.init_block(h, size_words, tag));
            }
        }

        if self.heap_ptr + total > self.words.len() {
            return None;
        }
        let h = self.heap_ptr;
        self.heap_ptr += total;
        Some(self.init_block(h, size_words, tag))
    }

    fn init_block(&mut self, h: usize, size_words: usize, tag: MemoryTag) -> HeapRef {
        let mut header = BlockHeader::new(tag, size_words);
        let r = HeapRef(h as u32 + 1);
        // Blocks born during marking start gray so their fields get scanned.
        if self.marker.is_marking() {
            header.set_marked(true);
            self.marker.worklist.push(r);
        }
        self.words[h] = header.bits;
        self.words[h + 1..h + 1 + size_words].fill(0);
        r
    }

    /// Check that `r` addresses a live block in this heap
    pub fn is_valid_ref(&self, r: HeapRef) -> bool {
        let data = r.data();
        data >= 1 && data < self.heap_ptr && self.header(r).tag() != MemoryTag::Free
    }

    #[inline]
    pub fn header(&self, r: HeapRef) -> BlockHeader {
        BlockHeader::from_bits(self.words[r.header()])
    }

    #[inline]
    pub(super) fn set_header(&mut self, r: HeapRef, header: BlockHeader) {
        self.words[r.header()] = header.bits;
    }

    #[inline]
    pub fn tag(&self, r: HeapRef) -> MemoryTag {
        self.header(r).tag()
    }

    #[inline]
    pub fn size_words(&self, r: HeapRef) -> usize {
        self.header(r).size_words()
    }

    #[inline]
    pub fn is_marked(&self, r: HeapRef) -> bool {
        self.header(r).is_marked()
    }

    /// Read data word `i` of block `r`
    #[inline]
    pub fn word(&self, r: HeapRef, i: usize) -> usize {
        debug_assert!(i < self.size_words(r), "word {} out of block bounds", i);
        self.words[r.data() + i]
    }

    /// Write a non-pointer data word
    #[inline]
    pub fn set_word(&mut self, r: HeapRef, i: usize, bits: usize) {
        debug_assert!(i < self.size_words(r), "word {} out of block bounds", i);
        self.words[r.data() + i] = bits;
    }

    #[inline]
    pub fn value(&self, r: HeapRef, i: usize) -> Value {
        Value::from_bits(self.word(r, i))
    }

    /// Initializing store into a block that is not yet reachable
    #[inline]
    pub fn init_value(&mut self, r: HeapRef, i: usize, value: Value) {
        self.set_word(r, i, value.bits());
    }

    /// Store into a reachable block, notifying the collector
    #[inline]
    pub fn write_value(&mut self, r: HeapRef, i: usize, value: Value) {
        self.set_word(r, i, value.bits());
        self.write_barrier(value);
    }

    /// Copy the data words of `src` into `dst`, which must be at least as large
    pub fn copy_block(&mut self, src: HeapRef, dst: HeapRef) {
        let n = self.size_words(src);
        debug_assert!(self.size_words(dst) >= n);
        self.words.copy_within(src.data()..src.data() + n, dst.data());
    }

    /// Iterator over all blocks in the heap, free ones included
    pub fn iter_blocks(&self) -> BlockIterator<'_> {
        BlockIterator {
            heap: self,
            offset: 0,
        }
    }
}

/// Iterator over blocks in the heap
pub struct BlockIterator<'a> {
    heap: &'a Heap,
    offset: usize,
}

impl<'a> Iterator for BlockIterator<'a> {
    type Item = (HeapRef, BlockHeader);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.heap.heap_ptr {
            return None;
        }
        let header = BlockHeader::from_bits(self.heap.words[self.offset]);
        let r = HeapRef(self.offset as u32 + 1);
        self.offset += header.size_words() + 1;
        Some((r, header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_creation() {
        let heap = Heap::new(1024);
        assert_eq!(heap.total_size, 1024);
        assert_eq!(heap.heap_used(), 0);
        assert_eq!(heap.free_space(), 1024);
    }

    #[test]
    fn test_alloc() {
        let mut heap = Heap::new(4096);

        let r = heap.alloc(8, MemoryTag::Object).unwrap();
        assert_eq!(heap.tag(r), MemoryTag::Object);
        assert_eq!(heap.size_words(r), 8);
        assert!(!heap.is_marked(r));
        assert_eq!(heap.heap_used(), 9 * WORD_SIZE);
        assert!(heap.is_valid_ref(r));
    }

    #[test]
    fn test_alloc_zeroed() {
        let mut heap = Heap::new(4096);
        let r = heap.alloc(4, MemoryTag::ValueArray).unwrap();
        for i in 0..4 {
            assert_eq!(heap.word(r, i), 0);
        }
    }

    #[test]
    fn test_zero_size_alloc() {
        let mut heap = Heap::new(4096);
        assert!(heap.alloc(0, MemoryTag::Object).is_none());
    }

    #[test]
    fn test_out_of_memory() {
        let mut heap = Heap::new(1024);
        assert!(heap.alloc(2048 / WORD_SIZE, MemoryTag::Object).is_none());
    }

    #[test]
    fn test_block_iterator() {
        let mut heap = Heap::new(4096);

        heap.alloc(4, MemoryTag::Object);
        heap.alloc(8, MemoryTag::Context);
        heap.alloc(2, MemoryTag::Function);

        let tags: Vec<_> = heap.iter_blocks().map(|(_, h)| h.tag()).collect();
        assert_eq!(
            tags,
            vec![MemoryTag::Object, MemoryTag::Context, MemoryTag::Function]
        );
    }

    #[test]
    fn test_copy_block() {
        let mut heap = Heap::new(4096);
        let a = heap.alloc(3, MemoryTag::ValueArray).unwrap();
        let b = heap.alloc(3, MemoryTag::ValueArray).unwrap();
        heap.init_value(a, 0, Value::int(1));
        heap.init_value(a, 2, Value::int(3));
        heap.copy_block(a, b);
        assert_eq!(heap.value(b, 0), Value::int(1));
        assert_eq!(heap.value(b, 2), Value::int(3));
        heap.init_value(b, 0, Value::int(9));
        assert_eq!(heap.value(a, 0), Value::int(1));
    }

    #[test]
    fn test_header_mark_bit() {
        let mut header = BlockHeader::new(MemoryTag::Context, 8);
        assert!(!header.is_marked());

        header.set_marked(true);
        assert!(header.is_marked());
        assert_eq!(header.tag(), MemoryTag::Context);
        assert_eq!(header.size_words(), 8);

        header.set_marked(false);
        assert!(!header.is_marked());
    }
}
