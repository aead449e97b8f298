//! The thread-safe buffer where the acquisition worker leaves decoded blocks
//! for whoever is drawing them.

use ndarray::Array2;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

/// A cloneable handle to a shared FIFO of decoded blocks. The
/// worker is the only producer, the display loop the only consumer, and the
/// consumer never waits.
#[derive(Debug, Clone, Default)]
pub struct BlockQueue {
    blocks: Arc<Mutex<VecDeque<Array2<f64>>>>,
}

impl BlockQueue {
    /// Instantiate an empty queue.
    pub fn new() -> Self {
        BlockQueue {
            blocks: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    // A panicking producer must not take the display down with it
    fn lock(&self) -> MutexGuard<'_, VecDeque<Array2<f64>>> {
        self.blocks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a decoded block.
    pub fn push(&self, block: Array2<f64>) {
        self.lock().push_back(block);
    }

    /// Take everything queued so far, oldest first, without blocking on
    /// new data.
    pub fn drain(&self) -> Vec<Array2<f64>> {
        self.lock().drain(..).collect()
    }

    /// Blocks waiting.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Throws away every waiting block.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Iterator for BlockQueue {
    type Item = Array2<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_across_threads() {
        let queue = BlockQueue::new();
        let producer = queue.clone();

        thread::spawn(move || {
            for samples in 1..=3 {
                producer.push(Array2::zeros((2, samples)));
            }
        })
        .join()
        .unwrap();

        let sizes: Vec<_> = queue.drain().iter().map(Array2::ncols).collect();
        assert_eq!(sizes, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn iterator_pops_front() {
        let mut queue = BlockQueue::new();
        queue.push(Array2::zeros((1, 4)));
        queue.push(Array2::zeros((1, 5)));
        assert_eq!(queue.next().map(|m| m.ncols()), Some(4));
        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.next().is_none());
    }
}
