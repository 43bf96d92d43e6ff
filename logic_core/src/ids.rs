//! Engine-assigned and user-assigned object identifiers.

use std::fmt;

/// 64-bit engine-assigned id: monotonic, unique per engine, preserved by
/// save/load, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque 128-bit user id, expressed as two 64-bit halves and set by the
/// caller rather than the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UserId {
    pub high: u64,
    pub low: u64,
}

/// Monotonic allocator for `NodeId`s, persisted across save/load as
/// `last_object_id`.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Resumes allocation after a load, continuing from `last_object_id + 1`.
    pub fn resume_from(last_object_id: u64) -> Self {
        Self { last: last_object_id }
    }

    pub fn last_object_id(&self) -> u64 {
        self.last
    }

    pub fn allocate(&mut self) -> NodeId {
        self.last += 1;
        NodeId(self.last)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_monotonic_and_resumable() {
        let mut alloc = IdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(a, NodeId(1));
        assert_eq!(b, NodeId(2));

        let mut resumed = IdAllocator::resume_from(alloc.last_object_id());
        let c = resumed.allocate();
        assert_eq!(c, NodeId(3));
    }
}
