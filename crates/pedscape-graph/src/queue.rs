use std::collections::VecDeque;

use fxhash::FxHashSet;

use crate::node::Node;

fn bit_key(n: &Node) -> (u32, u32, u32) {
    (n.x.to_bits(), n.y.to_bits(), n.z.to_bits())
}

/// FIFO queue over `Node` that remembers every node ever admitted (by exact
/// coordinate bit pattern, not the tolerance-based `Node` equality) and
/// refuses to re-admit it. The seen-set is monotone non-shrinking except
/// via `pop_forget`.
#[derive(Debug, Default)]
pub struct UniqueQueue {
    queue: VecDeque<Node>,
    seen: FxHashSet<(u32, u32, u32)>,
}

impl UniqueQueue {
    pub fn new() -> Self {
        UniqueQueue {
            queue: VecDeque::new(),
            seen: FxHashSet::default(),
        }
    }

    /// Inserts `n` iff it has never been pushed before (including after
    /// being popped). Returns whether it was inserted.
    pub fn push(&mut self, n: Node) -> bool {
        if !self.seen.insert(bit_key(&n)) {
            return false;
        }
        self.queue.push_back(n);
        true
    }

    /// Inserts without the uniqueness check, marking it seen regardless.
    pub fn force_push(&mut self, n: Node) -> bool {
        self.seen.insert(bit_key(&n));
        self.queue.push_back(n);
        true
    }

    /// Removes the front element but keeps its seen marker.
    pub fn pop(&mut self) -> Option<Node> {
        self.queue.pop_front()
    }

    /// Removes the front element and clears its seen marker, letting it be
    /// pushed again later.
    pub fn pop_forget(&mut self) -> Option<Node> {
        let n = self.queue.pop_front()?;
        self.seen.remove(&bit_key(&n));
        Some(n)
    }

    pub fn has(&self, n: &Node) -> bool {
        self.seen.contains(&bit_key(n))
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Empties the queue but preserves the seen-set memory.
    pub fn clear_queue_only(&mut self) {
        self.queue.clear();
    }

    /// Pops up to `max` elements; each advances the seen marker exactly as
    /// `pop` does.
    pub fn pop_many(&mut self, max: usize) -> Vec<Node> {
        let mut out = Vec::with_capacity(max.min(self.queue.len()));
        while out.len() < max {
            match self.pop() {
                Some(n) => out.push(n),
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn n(x: f32, y: f32, z: f32, id: i32) -> Node {
        Node::new(x, y, z, id, NodeType::Graph)
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let mut q = UniqueQueue::new();
        assert!(q.push(n(0.0, 0.0, 0.0, 0)));
        assert!(!q.push(n(0.0, 0.0, 0.0, 1)));
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn pop_retains_seen_marker() {
        let mut q = UniqueQueue::new();
        q.push(n(1.0, 1.0, 1.0, 0));
        q.pop();
        assert!(!q.push(n(1.0, 1.0, 1.0, 1)));
    }

    #[test]
    fn pop_forget_allows_readmission() {
        let mut q = UniqueQueue::new();
        q.push(n(1.0, 1.0, 1.0, 0));
        q.pop_forget();
        assert!(q.push(n(1.0, 1.0, 1.0, 1)));
    }

    #[test]
    fn pop_many_respects_max() {
        let mut q = UniqueQueue::new();
        for i in 0..10 {
            q.push(n(i as f32, 0.0, 0.0, i));
        }
        let batch = q.pop_many(4);
        assert_eq!(batch.len(), 4);
        assert_eq!(q.size(), 6);
    }
}
