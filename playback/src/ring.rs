//! Fixed-capacity FIFO of sample blocks
//!
//! Owned by the render context. Storage is allocated once at construction;
//! `push`/`pop`/`peek`/`clear` only move indices and slot contents.

use crate::block::Block;
use crate::error::RingCondition;

/// Ring of [`Block`]s with drop-oldest overflow
///
/// FIFO order matches push order. Temporal order holds only if the producer
/// pushes blocks in non-decreasing `start_sample` order; the ring never sorts.
#[derive(Debug)]
pub struct BlockRing {
    slots: Box<[Option<Block>]>,
    /// Next slot to write
    head: usize,
    /// Oldest live slot
    tail: usize,
    count: usize,
    full: bool,
}

impl BlockRing {
    /// Create a ring holding up to `capacity` blocks (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
            full: false,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Insert a block at the head
    ///
    /// When the ring is full the oldest block is overwritten and dropped, and
    /// `Overflow` is returned. The new block is stored either way.
    pub fn push(&mut self, block: Block) -> Result<(), RingCondition> {
        let capacity = self.capacity();
        let overflow = if self.full {
            // head == tail: the slot about to be written holds the oldest block
            let dropped_start = self.slots[self.head]
                .as_ref()
                .map(Block::start_sample)
                .unwrap_or_default();
            self.tail = (self.tail + 1) % capacity;
            Some(RingCondition::Overflow { dropped_start })
        } else {
            self.count += 1;
            None
        };

        self.slots[self.head] = Some(block);
        self.head = (self.head + 1) % capacity;
        self.full = self.count == capacity;

        match overflow {
            Some(condition) => Err(condition),
            None => Ok(()),
        }
    }

    /// Oldest block, without removing it
    #[inline]
    pub fn peek(&self) -> Option<&Block> {
        if self.count == 0 {
            return None;
        }
        self.slots[self.tail].as_ref()
    }

    /// Remove and return the oldest block
    pub fn pop(&mut self) -> Result<Block, RingCondition> {
        if self.count == 0 {
            return Err(RingCondition::Underflow);
        }
        let block = self.slots[self.tail]
            .take()
            .ok_or(RingCondition::Underflow)?;
        self.tail = (self.tail + 1) % self.capacity();
        self.count -= 1;
        self.full = false;
        Ok(block)
    }

    /// Forget every queued block in O(1)
    ///
    /// Stale slots stay allocated until a later push overwrites them; they are
    /// unreachable through the ring's API.
    pub fn clear(&mut self) {
        self.tail = self.head;
        self.count = 0;
        self.full = false;
    }

    /// Queued blocks, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Block> + '_ {
        let capacity = self.capacity();
        (0..self.count).filter_map(move |i| self.slots[(self.tail + i) % capacity].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(start: u64, len: usize) -> Block {
        Block::new(start, vec![start as f64; len])
    }

    // =============================================================
    // FIFO behaviour
    // =============================================================

    #[test]
    fn test_pop_order_matches_push_order() {
        let mut ring = BlockRing::new(8);
        for i in 0..8 {
            ring.push(block(i * 16, 16)).unwrap();
        }
        assert!(ring.is_full());
        for i in 0..8 {
            assert_eq!(ring.pop().unwrap().start_sample(), i * 16);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_fifo_survives_wraparound() {
        let mut ring = BlockRing::new(3);
        let mut next_push = 0u64;
        let mut next_pop = 0u64;
        for _ in 0..10 {
            ring.push(block(next_push, 4)).unwrap();
            next_push += 4;
            ring.push(block(next_push, 4)).unwrap();
            next_push += 4;
            assert_eq!(ring.pop().unwrap().start_sample(), next_pop);
            next_pop += 4;
            assert_eq!(ring.pop().unwrap().start_sample(), next_pop);
            next_pop += 4;
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_pop_empty_is_underflow() {
        let mut ring = BlockRing::new(4);
        assert_eq!(ring.pop(), Err(RingCondition::Underflow));
        ring.push(block(0, 1)).unwrap();
        ring.pop().unwrap();
        assert_eq!(ring.pop(), Err(RingCondition::Underflow));
    }

    // =============================================================
    // Overflow (drop-oldest)
    // =============================================================

    #[test]
    fn test_overflow_evicts_exactly_the_oldest() {
        let mut ring = BlockRing::new(4);
        for i in 0..4 {
            ring.push(block(i * 10, 10)).unwrap();
        }

        let result = ring.push(block(40, 10));
        assert_eq!(result, Err(RingCondition::Overflow { dropped_start: 0 }));
        assert_eq!(ring.len(), 4);
        assert!(ring.is_full());

        let starts: Vec<u64> = ring.iter().map(Block::start_sample).collect();
        assert_eq!(starts, vec![10, 20, 30, 40]);
        assert_eq!(ring.peek().unwrap().start_sample(), 10);
    }

    #[test]
    fn test_repeated_overflow_keeps_newest() {
        let mut ring = BlockRing::new(2);
        for i in 0..5 {
            let _ = ring.push(block(i, 1));
        }
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop().unwrap().start_sample(), 3);
        assert_eq!(ring.pop().unwrap().start_sample(), 4);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut ring = BlockRing::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(block(0, 1)).unwrap();
        assert!(ring.push(block(1, 1)).is_err());
        assert_eq!(ring.peek().unwrap().start_sample(), 1);
    }

    // =============================================================
    // Peek / clear
    // =============================================================

    #[test]
    fn test_peek_does_not_move() {
        let mut ring = BlockRing::new(4);
        assert!(ring.peek().is_none());
        ring.push(block(7, 3)).unwrap();
        ring.push(block(10, 3)).unwrap();
        for _ in 0..5 {
            assert_eq!(ring.peek().unwrap().start_sample(), 7);
        }
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_clear_empties_any_state() {
        let mut ring = BlockRing::new(3);
        ring.clear();
        assert!(ring.peek().is_none());

        for i in 0..5 {
            let _ = ring.push(block(i, 2));
        }
        ring.pop().unwrap();
        ring.clear();
        assert!(ring.peek().is_none());
        assert_eq!(ring.pop(), Err(RingCondition::Underflow));
        assert_eq!(ring.len(), 0);
        assert!(!ring.is_full());
        assert_eq!(ring.iter().count(), 0);
    }

    #[test]
    fn test_push_after_clear_reuses_slots() {
        let mut ring = BlockRing::new(2);
        ring.push(block(0, 1)).unwrap();
        ring.push(block(1, 1)).unwrap();
        ring.clear();
        ring.push(block(100, 1)).unwrap();
        ring.push(block(101, 1)).unwrap();
        assert_eq!(ring.pop().unwrap().start_sample(), 100);
        assert_eq!(ring.pop().unwrap().start_sample(), 101);
    }
}
