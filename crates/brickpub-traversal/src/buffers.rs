//! Buffered exchange
//!
//! BUFEXCHG STORE snapshots the accumulated content into a named buffer;
//! RETRIEVE replaces the accumulated content from it. Buffers live for
//! one traversal pass and carry partial assembly states across steps,
//! typically to show a sub-assembly being built and then re-show the
//! main assembly.

use std::collections::HashMap;

use tracing::trace;

use crate::accumulator::ContentSnapshot;

/// Named content snapshots for one traversal pass
#[derive(Debug, Clone, Default)]
pub struct BufferStore {
    slots: HashMap<char, ContentSnapshot>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot under a buffer name, replacing any previous one
    pub fn store(&mut self, buffer: char, snapshot: ContentSnapshot) {
        trace!(buffer = %buffer, lines = snapshot.len(), "buffer stored");
        self.slots.insert(buffer, snapshot);
    }

    /// The snapshot stored under a buffer name
    pub fn retrieve(&self, buffer: char) -> Option<&ContentSnapshot> {
        self.slots.get(&buffer)
    }

    pub fn contains(&self, buffer: char) -> bool {
        self.slots.contains_key(&buffer)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickpub_core::data::Where;

    fn snapshot(lines: &[&str]) -> ContentSnapshot {
        ContentSnapshot {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            index: (0..lines.len()).map(|i| Where::new("m.ldr", 0, i)).collect(),
        }
    }

    #[test]
    fn test_store_and_retrieve() {
        let mut buffers = BufferStore::new();
        buffers.store('A', snapshot(&["1 16 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat"]));
        assert!(buffers.contains('A'));
        assert_eq!(buffers.retrieve('A').map(ContentSnapshot::len), Some(1));
        assert!(buffers.retrieve('B').is_none());
    }

    #[test]
    fn test_store_replaces_previous() {
        let mut buffers = BufferStore::new();
        buffers.store('A', snapshot(&["a", "b"]));
        buffers.store('A', snapshot(&["c"]));
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers.retrieve('A').map(ContentSnapshot::len), Some(1));
    }
}
