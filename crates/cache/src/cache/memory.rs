// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! The memory manager contract: the host-side owner of weak cell values.
//!
//! When the retention policy weakens a cell, the cache transfers the value's only [`Rc`] to
//! the memory manager. The manager keeps the value alive for as long as it chooses; when it
//! reclaims one, it pushes the cell's handle onto the [`ReclaimQueue`], and the cache drains
//! that queue at the top of every public operation, finalizing the eviction. The queue is a
//! single-producer (manager) / single-consumer (cache drain) channel; there is no background
//! task.

use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

use ahash::AHashMap;

use crate::cache::cell::CellId;

/// The post-reclaim notification queue shared between a cache and its memory manager.
#[derive(Clone, Debug, Default)]
pub struct ReclaimQueue(Rc<RefCell<VecDeque<CellId>>>);

impl ReclaimQueue {
    /// Creates a new empty [`ReclaimQueue`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a reclaimed cell for the next cache drain.
    pub fn push(&self, cell: CellId) {
        self.0.borrow_mut().push_back(cell);
    }

    /// Dequeues the next reclaimed cell.
    pub fn pop(&self) -> Option<CellId> {
        self.0.borrow_mut().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// The host memory manager contract for weak cell values.
///
/// Implementations own the sole strong reference to every weak cell's value and decide how
/// long those values stay alive. Reclaiming a value must push the cell's handle onto the
/// bound [`ReclaimQueue`]; releasing on behalf of the cache (`forget`) must not.
pub trait MemoryManager<V>: fmt::Debug {
    /// Binds the notification queue. Called once when the manager is installed in a cache.
    fn bind(&mut self, queue: ReclaimQueue);

    /// Takes ownership of a weakened cell's value.
    fn retain(&mut self, cell: CellId, value: Rc<V>);

    /// Releases a retained value on behalf of the cache (strengthen or removal).
    ///
    /// No notification is produced; the cache has already accounted for the cell.
    fn forget(&mut self, cell: CellId);

    /// Reclaims up to `count` retained values, oldest-retained first, notifying the cache.
    ///
    /// Returns the number of values actually reclaimed.
    fn reclaim_oldest(&mut self, count: usize) -> usize;

    /// Reclaims every retained value, notifying the cache.
    ///
    /// Returns the number of values reclaimed.
    fn reclaim_all(&mut self) -> usize;

    /// Returns the number of values currently retained.
    fn retained_count(&self) -> usize;

    /// Drops every retained value without notification (cache clear).
    fn clear(&mut self);
}

/// The default [`MemoryManager`] implementation.
///
/// Retains weakened values in weaken order up to an optional capacity; exceeding the
/// capacity reclaims the oldest retained value, modeling memory pressure proportional to
/// the number of evictable entries. Unbounded by default.
pub struct BoundedMemoryManager<V> {
    retained: AHashMap<CellId, Rc<V>>,
    // Weaken order, oldest first. Forgotten cells leave tombstones which are skipped
    // lazily on reclaim, keeping both retain and forget O(1).
    order: VecDeque<CellId>,
    capacity: Option<usize>,
    queue: Option<ReclaimQueue>,
}

impl<V> BoundedMemoryManager<V> {
    /// Creates a new [`BoundedMemoryManager`] instance with the given retained capacity.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            retained: AHashMap::new(),
            order: VecDeque::new(),
            capacity,
            queue: None,
        }
    }

    /// Returns the retained capacity, or `None` if unbounded.
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn reclaim_front(&mut self) -> Option<CellId> {
        while let Some(cell) = self.order.pop_front() {
            if self.retained.remove(&cell).is_some() {
                if let Some(queue) = &self.queue {
                    queue.push(cell);
                }
                return Some(cell);
            }
        }
        None
    }
}

impl<V> Default for BoundedMemoryManager<V> {
    /// Creates a new default [`BoundedMemoryManager`] instance (unbounded).
    fn default() -> Self {
        Self::new(None)
    }
}

impl<V> fmt::Debug for BoundedMemoryManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(BoundedMemoryManager))
            .field("retained", &self.retained.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<V> MemoryManager<V> for BoundedMemoryManager<V> {
    fn bind(&mut self, queue: ReclaimQueue) {
        self.queue = Some(queue);
    }

    fn retain(&mut self, cell: CellId, value: Rc<V>) {
        self.retained.insert(cell, value);
        self.order.push_back(cell);
        if let Some(capacity) = self.capacity {
            while self.retained.len() > capacity {
                self.reclaim_front();
            }
        }
    }

    fn forget(&mut self, cell: CellId) {
        self.retained.remove(&cell);
    }

    fn reclaim_oldest(&mut self, count: usize) -> usize {
        let mut reclaimed = 0;
        while reclaimed < count {
            if self.reclaim_front().is_none() {
                break;
            }
            reclaimed += 1;
        }
        reclaimed
    }

    fn reclaim_all(&mut self) -> usize {
        let count = self.retained.len();
        self.reclaim_oldest(count)
    }

    fn retained_count(&self) -> usize {
        self.retained.len()
    }

    fn clear(&mut self) {
        self.retained.clear();
        self.order.clear();
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn manager_with_queue(capacity: Option<usize>) -> (BoundedMemoryManager<String>, ReclaimQueue) {
        let mut manager = BoundedMemoryManager::new(capacity);
        let queue = ReclaimQueue::new();
        manager.bind(queue.clone());
        (manager, queue)
    }

    #[rstest]
    fn test_retain_and_forget_produce_no_notifications() {
        let (mut manager, queue) = manager_with_queue(None);
        manager.retain(CellId(0), Rc::new("a".to_string()));
        manager.retain(CellId(1), Rc::new("b".to_string()));
        assert_eq!(manager.retained_count(), 2);

        manager.forget(CellId(0));
        assert_eq!(manager.retained_count(), 1);
        assert!(queue.is_empty());
    }

    #[rstest]
    fn test_reclaim_oldest_notifies_in_weaken_order() {
        let (mut manager, queue) = manager_with_queue(None);
        manager.retain(CellId(3), Rc::new("a".to_string()));
        manager.retain(CellId(7), Rc::new("b".to_string()));
        manager.retain(CellId(5), Rc::new("c".to_string()));

        assert_eq!(manager.reclaim_oldest(2), 2);
        assert_eq!(queue.pop(), Some(CellId(3)));
        assert_eq!(queue.pop(), Some(CellId(7)));
        assert_eq!(queue.pop(), None);
        assert_eq!(manager.retained_count(), 1);
    }

    #[rstest]
    fn test_reclaim_skips_forgotten_tombstones() {
        let (mut manager, queue) = manager_with_queue(None);
        manager.retain(CellId(0), Rc::new("a".to_string()));
        manager.retain(CellId(1), Rc::new("b".to_string()));
        manager.forget(CellId(0));

        assert_eq!(manager.reclaim_oldest(1), 1);
        assert_eq!(queue.pop(), Some(CellId(1)));
    }

    #[rstest]
    fn test_capacity_pressure_reclaims_oldest() {
        let (mut manager, queue) = manager_with_queue(Some(2));
        manager.retain(CellId(0), Rc::new("a".to_string()));
        manager.retain(CellId(1), Rc::new("b".to_string()));
        manager.retain(CellId(2), Rc::new("c".to_string()));

        assert_eq!(manager.retained_count(), 2);
        assert_eq!(queue.pop(), Some(CellId(0)));
        assert!(queue.is_empty());
    }

    #[rstest]
    fn test_reclaim_all_then_clear() {
        let (mut manager, queue) = manager_with_queue(None);
        manager.retain(CellId(0), Rc::new("a".to_string()));
        manager.retain(CellId(1), Rc::new("b".to_string()));

        assert_eq!(manager.reclaim_all(), 2);
        assert_eq!(queue.len(), 2);

        manager.clear();
        assert_eq!(manager.retained_count(), 0);
    }
}
