//! Property-bearing objects
//!
//! Objects back the dynamic scopes (global, `with`, QML, and call contexts
//! that received bindings at run time). Only own data properties exist here;
//! prototype chains and accessors belong to the full object model.
//!
//! Layout:
//! ```text
//! Object block:      [props]                      props: ValueArray or null
//! ValueArray block:  [len, key0, value0, attrs0, key1, value1, attrs1, ...]
//! ```

use crate::engine::Engine;
use crate::error::Result;
use crate::gc::{Heap, HeapRef, MemoryTag, Tracer};
use crate::runtime::Atom;
use crate::value::Value;

/// Word index of the property array reference
const PROPS: usize = 0;
/// Data words of an object block
pub(crate) const OBJECT_WORDS: usize = 1;

/// Words per property entry: key, value, attributes
const ENTRY_WORDS: usize = 3;
/// Initial number of entries in a property array
const MIN_CAPACITY: usize = 4;

/// Property attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAttributes(u8);

impl PropertyAttributes {
    pub const WRITABLE: u8 = 1 << 0;
    pub const ENUMERABLE: u8 = 1 << 1;
    pub const CONFIGURABLE: u8 = 1 << 2;

    pub const fn new(bits: u8) -> Self {
        PropertyAttributes(bits & 0x7)
    }

    /// Writable, enumerable and configurable
    pub const fn data() -> Self {
        PropertyAttributes(Self::WRITABLE | Self::ENUMERABLE | Self::CONFIGURABLE)
    }

    pub const fn with_configurable(self, configurable: bool) -> Self {
        if configurable {
            PropertyAttributes(self.0 | Self::CONFIGURABLE)
        } else {
            PropertyAttributes(self.0 & !Self::CONFIGURABLE)
        }
    }

    pub const fn with_writable(self, writable: bool) -> Self {
        if writable {
            PropertyAttributes(self.0 | Self::WRITABLE)
        } else {
            PropertyAttributes(self.0 & !Self::WRITABLE)
        }
    }

    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE != 0
    }

    pub const fn is_configurable(self) -> bool {
        self.0 & Self::CONFIGURABLE != 0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Reference to an object block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(HeapRef);

impl ObjectRef {
    /// View `value` as an object if it references an object block
    pub fn from_value(heap: &Heap, value: Value) -> Option<ObjectRef> {
        let r = value.to_ref()?;
        (heap.is_valid_ref(r) && heap.tag(r) == MemoryTag::Object).then_some(ObjectRef(r))
    }

    #[inline]
    pub fn heap_ref(self) -> HeapRef {
        self.0
    }

    #[inline]
    pub fn to_value(self) -> Value {
        Value::from_ref(self.0)
    }

    fn props(self, heap: &Heap) -> Option<HeapRef> {
        heap.value(self.0, PROPS).to_ref()
    }

    /// Number of own properties
    pub fn len(self, heap: &Heap) -> usize {
        self.props(heap).map_or(0, |props| entry_count(heap, props))
    }

    pub fn is_empty(self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    fn find(self, heap: &Heap, key: Atom) -> Option<(HeapRef, usize)> {
        let props = self.props(heap)?;
        let key = Value::atom(key);
        (0..entry_count(heap, props))
            .find(|&i| heap.value(props, entry_word(i)) == key)
            .map(|i| (props, i))
    }

    /// Own property value and attributes
    pub fn get_own_property(self, heap: &Heap, key: Atom) -> Option<(Value, PropertyAttributes)> {
        let (props, i) = self.find(heap, key)?;
        Some((
            heap.value(props, entry_word(i) + 1),
            entry_attributes(heap, props, i),
        ))
    }

    pub fn has_property(self, heap: &Heap, key: Atom) -> bool {
        self.find(heap, key).is_some()
    }

    pub fn get(self, heap: &Heap, key: Atom) -> Option<Value> {
        self.get_own_property(heap, key).map(|(value, _)| value)
    }

    /// Own property names in definition order (deletions may reorder)
    pub fn keys(self, heap: &Heap) -> Vec<Atom> {
        let Some(props) = self.props(heap) else {
            return Vec::new();
        };
        (0..entry_count(heap, props))
            .filter_map(|i| heap.value(props, entry_word(i)).to_atom())
            .collect()
    }

    /// Remove a property
    ///
    /// Returns false only for a non-configurable property, which is left intact.
    pub fn delete(self, heap: &mut Heap, key: Atom) -> bool {
        let Some((props, i)) = self.find(heap, key) else {
            return true;
        };
        if !entry_attributes(heap, props, i).is_configurable() {
            return false;
        }
        let last = entry_count(heap, props) - 1;
        if i != last {
            for w in 0..ENTRY_WORDS {
                let moved = heap.value(props, entry_word(last) + w);
                heap.write_value(props, entry_word(i) + w, moved);
            }
        }
        for w in 0..ENTRY_WORDS {
            heap.set_word(props, entry_word(last) + w, Value::undefined().bits());
        }
        heap.set_word(props, 0, Value::int(last as i32).bits());
        true
    }

    /// Assign to a property, creating a plain data property if absent
    ///
    /// Returns `Ok(false)` when the existing property is read-only.
    pub fn put(self, engine: &mut Engine, key: Atom, value: Value) -> Result<bool> {
        if let Some((props, i)) = self.find(&engine.heap, key) {
            if !entry_attributes(&engine.heap, props, i).is_writable() {
                return Ok(false);
            }
            engine.heap.write_value(props, entry_word(i) + 1, value);
            return Ok(true);
        }
        self.define_own_property(engine, key, value, PropertyAttributes::data())
    }

    /// Define or redefine an own data property
    ///
    /// Returns `Ok(false)` when an existing property is not configurable.
    pub fn define_own_property(
        self,
        engine: &mut Engine,
        key: Atom,
        value: Value,
        attrs: PropertyAttributes,
    ) -> Result<bool> {
        if let Some((props, i)) = self.find(&engine.heap, key) {
            if !entry_attributes(&engine.heap, props, i).is_configurable() {
                return Ok(false);
            }
            let base = entry_word(i);
            engine.heap.write_value(props, base + 1, value);
            engine
                .heap
                .set_word(props, base + 2, Value::int(attrs.bits() as i32).bits());
            return Ok(true);
        }

        let props = self.reserve(engine, value)?;
        let heap = &mut engine.heap;
        let n = entry_count(heap, props);
        let base = entry_word(n);
        heap.set_word(props, base, Value::atom(key).bits());
        heap.write_value(props, base + 1, value);
        heap.set_word(props, base + 2, Value::int(attrs.bits() as i32).bits());
        heap.set_word(props, 0, Value::int(n as i32 + 1).bits());
        Ok(true)
    }

    /// Make room for one more entry, growing the property array if needed
    fn reserve(self, engine: &mut Engine, pending: Value) -> Result<HeapRef> {
        let old = self.props(&engine.heap);
        let (len, capacity) = match old {
            Some(props) => (
                entry_count(&engine.heap, props),
                (engine.heap.size_words(props) - 1) / ENTRY_WORDS,
            ),
            None => (0, 0),
        };
        if let Some(props) = old {
            if len < capacity {
                return Ok(props);
            }
        }

        let new_capacity = (capacity * 2).max(MIN_CAPACITY);
        let props = engine.alloc_rooted(
            MemoryTag::ValueArray,
            1 + new_capacity * ENTRY_WORDS,
            &[self.to_value(), pending],
        )?;
        match old {
            Some(old) => engine.heap.copy_block(old, props),
            None => engine.heap.init_value(props, 0, Value::int(0)),
        }
        engine.heap.write_value(self.0, PROPS, Value::from_ref(props));
        Ok(props)
    }
}

#[inline]
fn entry_word(i: usize) -> usize {
    1 + i * ENTRY_WORDS
}

fn entry_count(heap: &Heap, props: HeapRef) -> usize {
    heap.value(props, 0).to_i32().unwrap_or(0) as usize
}

fn entry_attributes(heap: &Heap, props: HeapRef, i: usize) -> PropertyAttributes {
    let bits = heap.value(props, entry_word(i) + 2).to_i32().unwrap_or(0);
    PropertyAttributes::new(bits as u8)
}

impl Engine {
    /// Allocate an empty object
    pub fn new_object(&mut self) -> Result<ObjectRef> {
        let r = self.alloc(MemoryTag::Object, OBJECT_WORDS)?;
        self.heap.init_value(r, PROPS, Value::null());
        Ok(ObjectRef(r))
    }
}

/// Initialize a freshly allocated object block
pub(crate) fn init_object(heap: &mut Heap, r: HeapRef) -> ObjectRef {
    heap.init_value(r, PROPS, Value::null());
    ObjectRef(r)
}

/// Trace callback for `MemoryTag::Object`
pub(crate) fn mark_object(heap: &Heap, r: HeapRef, tracer: &mut Tracer) {
    tracer.trace_value(heap.value(r, PROPS));
}
