//! Script value representation
//!
//! A value is a tagged union that fits in a single machine word, so every
//! slot of a heap block can be scanned by the collector without knowing the
//! type of the block it belongs to.
//!
//! # Value encoding
//! - Bit 0 = 0: 31-bit signed integer (shifted left by 1)
//! - Low bits = 01 (`WORD_SIZE - 1` mask): reference to a heap block
//! - Bits 0-1 = 11: special values (null, undefined, bool, empty, atom)

use std::fmt;

use crate::gc::HeapRef;
use crate::runtime::Atom;

/// Size of a word in bytes (matches pointer size)
#[cfg(target_pointer_width = "64")]
pub const WORD_SIZE: usize = 8;
#[cfg(target_pointer_width = "32")]
pub const WORD_SIZE: usize = 4;

/// Tag values for value encoding
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// 31-bit signed integer (1 bit tag)
    Int = 0,
    /// Reference to a heap block
    Ptr = 1,
    /// Special value marker (2 bits tag)
    Special = 3,
}

/// Special value subtypes (5-bit tag)
/// These include the `Tag::Special` (3) base value
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialTag {
    Bool = 3,       // Special | (0 << 2)
    Null = 7,       // Special | (1 << 2)
    Undefined = 11, // Special | (2 << 2)
    Empty = 15,     // Special | (3 << 2)
    Atom = 19,      // Special | (4 << 2)
}

/// Raw value representation - a single word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawValue(pub usize);

impl RawValue {
    /// Number of bits used for special value tag
    const SPECIAL_TAG_BITS: u32 = 5;

    /// Create a new integer value (31-bit signed)
    #[inline]
    pub const fn from_i32(val: i32) -> Self {
        RawValue(((val as i64) << 1) as usize)
    }

    /// Create a new special value
    #[inline]
    pub const fn make_special(tag: u8, val: u32) -> Self {
        RawValue((tag as usize) | ((val as usize) << Self::SPECIAL_TAG_BITS))
    }

    /// Create a reference to the heap block whose data starts at `index`
    #[inline]
    pub const fn from_heap_index(index: u32) -> Self {
        RawValue((index as usize) * WORD_SIZE + Tag::Ptr as usize)
    }

    #[inline]
    pub const fn is_int(self) -> bool {
        (self.0 & 1) == Tag::Int as usize
    }

    #[inline]
    pub const fn is_ptr(self) -> bool {
        (self.0 & (WORD_SIZE - 1)) == Tag::Ptr as usize
    }

    #[inline]
    pub const fn is_special(self) -> bool {
        (self.0 & 0x3) == Tag::Special as usize
    }

    /// Get integer value (assumes is_int() is true)
    #[inline]
    pub const fn get_int(self) -> i32 {
        (self.0 as i64 >> 1) as i32
    }

    /// Get special tag (assumes is_special() is true)
    #[inline]
    pub const fn get_special_tag(self) -> u8 {
        (self.0 & ((1 << Self::SPECIAL_TAG_BITS) - 1)) as u8
    }

    /// Get special payload (assumes is_special() is true)
    #[inline]
    pub const fn get_special_value(self) -> u32 {
        (self.0 >> Self::SPECIAL_TAG_BITS) as u32
    }

    /// Get the heap word index (assumes is_ptr() is true)
    #[inline]
    pub const fn get_heap_index(self) -> u32 {
        ((self.0 - Tag::Ptr as usize) / WORD_SIZE) as u32
    }

    // Common special values
    pub const NULL: RawValue = RawValue::make_special(SpecialTag::Null as u8, 0);
    pub const UNDEFINED: RawValue = RawValue::make_special(SpecialTag::Undefined as u8, 0);
    pub const EMPTY: RawValue = RawValue::make_special(SpecialTag::Empty as u8, 0);
    pub const FALSE: RawValue = RawValue::make_special(SpecialTag::Bool as u8, 0);
    pub const TRUE: RawValue = RawValue::make_special(SpecialTag::Bool as u8, 1);
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "Int({})", self.get_int())
        } else if *self == RawValue::NULL {
            write!(f, "Null")
        } else if *self == RawValue::UNDEFINED {
            write!(f, "Undefined")
        } else if *self == RawValue::EMPTY {
            write!(f, "Empty")
        } else if *self == RawValue::TRUE {
            write!(f, "Bool(true)")
        } else if *self == RawValue::FALSE {
            write!(f, "Bool(false)")
        } else if self.is_ptr() {
            write!(f, "Ref({})", self.get_heap_index())
        } else if self.is_special() && self.get_special_tag() == SpecialTag::Atom as u8 {
            write!(f, "Atom({})", self.get_special_value())
        } else {
            write!(f, "RawValue(0x{:x})", self.0)
        }
    }
}

/// Boxed script value
///
/// This is the type stored in every context slot and object property. The
/// `empty` value is the temporal dead zone marker: it is distinct from
/// `undefined` and is never a heap reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(pub RawValue);

impl Value {
    #[inline]
    pub const fn null() -> Self {
        Value(RawValue::NULL)
    }

    #[inline]
    pub const fn undefined() -> Self {
        Value(RawValue::UNDEFINED)
    }

    /// The uninitialized-binding marker
    #[inline]
    pub const fn empty() -> Self {
        Value(RawValue::EMPTY)
    }

    #[inline]
    pub const fn bool(b: bool) -> Self {
        if b {
            Value(RawValue::TRUE)
        } else {
            Value(RawValue::FALSE)
        }
    }

    /// Create an integer value (31-bit signed)
    #[inline]
    pub const fn int(val: i32) -> Self {
        assert!(fits_in_short_int(val), "Integer out of 31-bit range");
        Value(RawValue::from_i32(val))
    }

    /// Create an interned-name value
    #[inline]
    pub const fn atom(atom: Atom) -> Self {
        Value(RawValue::make_special(SpecialTag::Atom as u8, atom.id()))
    }

    /// Create a reference to a heap block
    #[inline]
    pub const fn from_ref(r: HeapRef) -> Self {
        Value(RawValue::from_heap_index(r.index()))
    }

    /// Reinterpret a heap word as a value
    #[inline]
    pub const fn from_bits(bits: usize) -> Self {
        Value(RawValue(bits))
    }

    #[inline]
    pub const fn bits(self) -> usize {
        self.0.0
    }

    // Type checking

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0.0 == RawValue::NULL.0
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0.0 == RawValue::UNDEFINED.0
    }

    /// Check if this is the temporal dead zone marker
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0.0 == RawValue::EMPTY.0
    }

    #[inline]
    pub const fn is_bool(self) -> bool {
        self.0.is_special() && self.0.get_special_tag() == SpecialTag::Bool as u8
    }

    #[inline]
    pub const fn is_int(self) -> bool {
        self.0.is_int()
    }

    /// Check if this references a heap block
    #[inline]
    pub const fn is_ptr(self) -> bool {
        self.0.is_ptr()
    }

    #[inline]
    pub const fn is_atom(self) -> bool {
        self.0.is_special() && self.0.get_special_tag() == SpecialTag::Atom as u8
    }

    #[inline]
    pub const fn is_nullish(self) -> bool {
        self.is_null() || self.is_undefined()
    }

    // Value extraction

    #[inline]
    pub const fn to_bool(self) -> Option<bool> {
        if self.is_bool() {
            Some(self.0.get_special_value() != 0)
        } else {
            None
        }
    }

    #[inline]
    pub const fn to_i32(self) -> Option<i32> {
        if self.is_int() {
            Some(self.0.get_int())
        } else {
            None
        }
    }

    #[inline]
    pub const fn to_atom(self) -> Option<Atom> {
        if self.is_atom() {
            Some(Atom::from_id(self.0.get_special_value()))
        } else {
            None
        }
    }

    /// Get the referenced heap block, returns None if not a reference
    #[inline]
    pub const fn to_ref(self) -> Option<HeapRef> {
        if self.is_ptr() {
            Some(HeapRef::from_index(self.0.get_heap_index()))
        } else {
            None
        }
    }

    #[inline]
    pub const fn raw(self) -> RawValue {
        self.0
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::undefined()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else if self.is_undefined() {
            write!(f, "undefined")
        } else if self.is_empty() {
            write!(f, "<empty>")
        } else if let Some(b) = self.to_bool() {
            write!(f, "{}", b)
        } else if let Some(i) = self.to_i32() {
            write!(f, "{}", i)
        } else if let Some(atom) = self.to_atom() {
            write!(f, "#atom{}", atom.id())
        } else {
            write!(f, "[object]")
        }
    }
}

/// Short integer range constants
pub const SHORT_INT_MIN: i32 = -(1 << 30);
pub const SHORT_INT_MAX: i32 = (1 << 30) - 1;

/// Check if an i32 fits in a short integer
#[inline]
pub const fn fits_in_short_int(val: i32) -> bool {
    val >= SHORT_INT_MIN && val <= SHORT_INT_MAX
}
