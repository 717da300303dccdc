//! Identity types shared across the page layer.
//!
//! Generalizes the teacher's `storage::page::PageId` (`pub type PageId =
//! u32`) and `index::IndexValue` type-alias pattern into real newtypes: the
//! spec distinguishes a page's own identity from the node-key space used
//! inside a leaf page's overflow map, and a type alias can't stop the two
//! from being confused at a call site the way a newtype can.

use std::fmt;

/// Unsigned 64-bit identity for a page in the page tree. The low bits pick
/// a slot within a leaf; the high bits address the leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey(pub u64);

impl PageKey {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identity of a logical record (node) inside a leaf page's record heap,
/// used as the key of the overflow map and of the HOT leaf's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(pub u64);

impl NodeKey {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Tag identifying which index (page tree) a reference belongs to, e.g.
/// the document index vs. a secondary HOT index, within one resource.
pub type IndexType = u8;
