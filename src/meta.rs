//! Per-node decode metadata.
//!
//! Every parsed node records the absolute offset it started at and whether
//! any of its required fields failed to decode. Corruption is a recorded
//! signal, not a refusal: a failed read gives the field a zero/empty
//! default and decoding of the remaining fields continues, and a parent is
//! corrupted whenever one of its children is. Callers test the root to
//! learn whether any part of the file is suspect, or walk down to find
//! exactly which node.

use serde::Serialize;

use crate::bytes::ByteCursor;
use crate::error::DexError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeMeta
{
    /// Absolute byte offset the node was decoded from.
    pub offset: u32,
    /// True iff a required field of this node, or of a node it owns, could
    /// not be decoded as specified.
    pub corrupted: bool,
}

impl NodeMeta
{
    pub fn at(offset: u32) -> NodeMeta
    {
        NodeMeta { offset, corrupted: false }
    }

    pub fn mark(&mut self)
    {
        self.corrupted = true;
    }

    /// Propagate a child's corruption flag into this node.
    pub fn absorb(&mut self, child: &NodeMeta)
    {
        if child.corrupted
        {
            self.corrupted = true;
        }
    }

    /// Unwrap a field read, substituting the default and marking the node
    /// when the read failed.
    pub(crate) fn take<T: Default>(&mut self, read: Result<T, DexError>) -> T
    {
        match read
        {
            Ok(v) => v,
            Err(_) =>
            {
                self.corrupted = true;
                T::default()
            }
        }
    }

    /// Fork a cursor view at `offset`, or mark the node and return an
    /// exhausted view when the offset lies outside the buffer.
    pub(crate) fn cursor_at<'a>(&mut self, base: &ByteCursor<'a>, offset: u32) -> ByteCursor<'a>
    {
        match base.at(offset)
        {
            Ok(cur) => cur,
            Err(_) =>
            {
                self.corrupted = true;
                base.at_end()
            }
        }
    }
}
