use std::collections::VecDeque;

/// A queue of items still to be explored.
pub trait ExplorationQueue<I> {
    fn push(&mut self, item: I);
    fn pop(&mut self) -> Option<I>;
}

/// Breadth-first exploration: the item discovered earliest is popped first.
pub struct BfsQueue<I> {
    queue: VecDeque<I>,
}

impl<I> BfsQueue<I> {
    pub fn with_capacity(capacity: usize) -> Self {
        BfsQueue {
            queue: VecDeque::with_capacity(capacity),
        }
    }
}

impl<I> ExplorationQueue<I> for BfsQueue<I> {
    fn push(&mut self, item: I) {
        self.queue.push_back(item);
    }

    fn pop(&mut self) -> Option<I> {
        self.queue.pop_front()
    }
}

/// Depth-first exploration: the item discovered latest is popped first.
pub struct DfsQueue<I> {
    queue: Vec<I>,
}

impl<I> DfsQueue<I> {
    pub fn with_capacity(capacity: usize) -> Self {
        DfsQueue {
            queue: Vec::with_capacity(capacity),
        }
    }
}

impl<I> ExplorationQueue<I> for DfsQueue<I> {
    fn push(&mut self, item: I) {
        self.queue.push(item);
    }

    fn pop(&mut self) -> Option<I> {
        self.queue.pop()
    }
}
