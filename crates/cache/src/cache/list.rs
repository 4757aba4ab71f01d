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

//! The access-order list: the cache's recency oracle.
//!
//! Cells live in an arena of recyclable slots addressed by stable [`CellId`] handles, so no
//! reference cycles and no unsafe pointer juggling are needed. Three intrusive chains thread
//! the occupied slots:
//!
//! - the main chain orders every cell by last touch, most-recent first;
//! - the strong chain and the weak chain order the cells of one strength each.
//!
//! Strength transitions happen at the strong/weak boundary of the main chain (new strong
//! cells are the most recent, demotion takes the oldest strong, promotion takes the newest
//! weak), so the strength chains stay ordered consistently with the main chain and the
//! oldest-strong / newest-weak / oldest-weak queries are all O(1).

use std::rc::Rc;

use crate::{
    cache::cell::{Cell, CellId, NIL},
    enums::Strength,
};

#[derive(Debug)]
enum Slot<K, V> {
    Occupied(Cell<K, V>),
    Vacant { next_free: usize },
}

/// A doubly linked access-order list over an arena of cell slots.
#[derive(Debug)]
pub(crate) struct AccessList<K, V> {
    slots: Vec<Slot<K, V>>,
    head: usize,
    tail: usize,
    strong_head: usize,
    strong_tail: usize,
    weak_head: usize,
    weak_tail: usize,
    free_head: usize,
    len: usize,
    strong_len: usize,
    weak_len: usize,
}

impl<K, V> AccessList<K, V> {
    /// Creates a new [`AccessList`] instance with the given slot capacity pre-allocated.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            strong_head: NIL,
            strong_tail: NIL,
            weak_head: NIL,
            weak_tail: NIL,
            free_head: NIL,
            len: 0,
            strong_len: 0,
            weak_len: 0,
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn strong_len(&self) -> usize {
        self.strong_len
    }

    pub const fn weak_len(&self) -> usize {
        self.weak_len
    }

    /// Returns the most recently touched cell.
    pub fn newest(&self) -> Option<CellId> {
        id_of(self.head)
    }

    /// Returns the least recently touched cell.
    pub fn oldest(&self) -> Option<CellId> {
        id_of(self.tail)
    }

    /// Returns the least recently touched strong cell.
    pub fn oldest_strong(&self) -> Option<CellId> {
        id_of(self.strong_tail)
    }

    /// Returns the most recently touched weak cell.
    pub fn newest_weak(&self) -> Option<CellId> {
        id_of(self.weak_head)
    }

    /// Returns the least recently touched weak cell.
    pub fn oldest_weak(&self) -> Option<CellId> {
        id_of(self.weak_tail)
    }

    /// Returns whether `id` addresses a live cell.
    pub fn is_occupied(&self, id: CellId) -> bool {
        matches!(self.slots.get(id.0), Some(Slot::Occupied(_)))
    }

    pub fn cell(&self, id: CellId) -> &Cell<K, V> {
        match &self.slots[id.0] {
            Slot::Occupied(cell) => cell,
            Slot::Vacant { .. } => panic!("vacant cell slot {}", id.0),
        }
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell<K, V> {
        match &mut self.slots[id.0] {
            Slot::Occupied(cell) => cell,
            Slot::Vacant { .. } => panic!("vacant cell slot {}", id.0),
        }
    }

    /// Inserts a new strong cell at the head of the list.
    pub fn insert_head(&mut self, key: K, value: Rc<V>) -> CellId {
        let cell = Cell::new(key, value);
        let ix = match self.free_head {
            NIL => {
                self.slots.push(Slot::Occupied(cell));
                self.slots.len() - 1
            }
            free => {
                let next_free = match self.slots[free] {
                    Slot::Vacant { next_free } => next_free,
                    Slot::Occupied(_) => panic!("free list corrupt at slot {free}"),
                };
                self.free_head = next_free;
                self.slots[free] = Slot::Occupied(cell);
                free
            }
        };
        self.link_main_front(ix);
        self.link_chain_front(ix, Strength::Strong);
        self.len += 1;
        self.strong_len += 1;
        CellId(ix)
    }

    /// Unlinks and removes the cell, recycling its slot.
    pub fn remove(&mut self, id: CellId) -> Cell<K, V> {
        let strength = self.cell(id).strength();
        self.unlink_main(id.0);
        self.unlink_chain(id.0, strength);
        self.len -= 1;
        match strength {
            Strength::Strong => self.strong_len -= 1,
            Strength::Weak => self.weak_len -= 1,
        }
        let slot = std::mem::replace(
            &mut self.slots[id.0],
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        self.free_head = id.0;
        match slot {
            Slot::Occupied(cell) => cell,
            Slot::Vacant { .. } => panic!("vacant cell slot {}", id.0),
        }
    }

    /// Moves the cell to the head of the main chain and of its strength chain.
    pub fn touch(&mut self, id: CellId) {
        if self.head != id.0 {
            self.unlink_main(id.0);
            self.link_main_front(id.0);
        }
        let strength = self.cell(id).strength();
        self.unlink_chain(id.0, strength);
        self.link_chain_front(id.0, strength);
    }

    /// Demotes a strong cell to weak, returning the released value for transfer to the
    /// memory manager. Returns `None` if the cell is already weak.
    pub fn demote(&mut self, id: CellId) -> Option<Rc<V>> {
        let released = self.cell_mut(id).release_strong()?;
        self.unlink_chain(id.0, Strength::Strong);
        self.link_chain_front(id.0, Strength::Weak);
        self.strong_len -= 1;
        self.weak_len += 1;
        Some(released)
    }

    /// Promotes a weak cell to strong as the most recent strong cell.
    ///
    /// Returns `false` (no state change) if the value has been reclaimed.
    pub fn promote_front(&mut self, id: CellId) -> bool {
        self.promote(id, true)
    }

    /// Promotes a weak cell to strong as the least recent strong cell.
    ///
    /// Returns `false` (no state change) if the value has been reclaimed.
    pub fn promote_back(&mut self, id: CellId) -> bool {
        self.promote(id, false)
    }

    fn promote(&mut self, id: CellId, front: bool) -> bool {
        let cell = self.cell_mut(id);
        if cell.strength() == Strength::Strong || !cell.restore_strong() {
            return cell.strength() == Strength::Strong;
        }
        self.unlink_chain(id.0, Strength::Weak);
        if front {
            self.link_chain_front(id.0, Strength::Strong);
        } else {
            self.link_chain_back(id.0, Strength::Strong);
        }
        self.weak_len -= 1;
        self.strong_len += 1;
        true
    }

    /// Drops every cell and resets all chains.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = NIL;
        self.tail = NIL;
        self.strong_head = NIL;
        self.strong_tail = NIL;
        self.weak_head = NIL;
        self.weak_tail = NIL;
        self.free_head = NIL;
        self.len = 0;
        self.strong_len = 0;
        self.weak_len = 0;
    }

    /// Iterates the main chain from most recent to least recent.
    pub fn iter(&self) -> AccessIter<'_, K, V> {
        AccessIter {
            list: self,
            next: self.head,
        }
    }

    // -- LINKING ---------------------------------------------------------------------------------

    fn link_main_front(&mut self, ix: usize) {
        let old_head = self.head;
        {
            let cell = self.cell_mut(CellId(ix));
            cell.prev = NIL;
            cell.next = old_head;
        }
        if old_head == NIL {
            self.tail = ix;
        } else {
            self.cell_mut(CellId(old_head)).prev = ix;
        }
        self.head = ix;
    }

    fn unlink_main(&mut self, ix: usize) {
        let (prev, next) = {
            let cell = self.cell(CellId(ix));
            (cell.prev, cell.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.cell_mut(CellId(prev)).next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.cell_mut(CellId(next)).prev = prev;
        }
    }

    fn chain_head(&self, strength: Strength) -> usize {
        match strength {
            Strength::Strong => self.strong_head,
            Strength::Weak => self.weak_head,
        }
    }

    fn chain_tail(&self, strength: Strength) -> usize {
        match strength {
            Strength::Strong => self.strong_tail,
            Strength::Weak => self.weak_tail,
        }
    }

    fn set_chain_head(&mut self, strength: Strength, ix: usize) {
        match strength {
            Strength::Strong => self.strong_head = ix,
            Strength::Weak => self.weak_head = ix,
        }
    }

    fn set_chain_tail(&mut self, strength: Strength, ix: usize) {
        match strength {
            Strength::Strong => self.strong_tail = ix,
            Strength::Weak => self.weak_tail = ix,
        }
    }

    fn link_chain_front(&mut self, ix: usize, strength: Strength) {
        let old_head = self.chain_head(strength);
        {
            let cell = self.cell_mut(CellId(ix));
            cell.chain_prev = NIL;
            cell.chain_next = old_head;
        }
        if old_head == NIL {
            self.set_chain_tail(strength, ix);
        } else {
            self.cell_mut(CellId(old_head)).chain_prev = ix;
        }
        self.set_chain_head(strength, ix);
    }

    fn link_chain_back(&mut self, ix: usize, strength: Strength) {
        let old_tail = self.chain_tail(strength);
        {
            let cell = self.cell_mut(CellId(ix));
            cell.chain_next = NIL;
            cell.chain_prev = old_tail;
        }
        if old_tail == NIL {
            self.set_chain_head(strength, ix);
        } else {
            self.cell_mut(CellId(old_tail)).chain_next = ix;
        }
        self.set_chain_tail(strength, ix);
    }

    fn unlink_chain(&mut self, ix: usize, strength: Strength) {
        let (prev, next) = {
            let cell = self.cell(CellId(ix));
            (cell.chain_prev, cell.chain_next)
        };
        if prev == NIL {
            self.set_chain_head(strength, next);
        } else {
            self.cell_mut(CellId(prev)).chain_next = next;
        }
        if next == NIL {
            self.set_chain_tail(strength, prev);
        } else {
            self.cell_mut(CellId(next)).chain_prev = prev;
        }
    }
}

const fn id_of(ix: usize) -> Option<CellId> {
    if ix == NIL { None } else { Some(CellId(ix)) }
}

/// Iterator over the main chain, most-recent first.
#[derive(Debug)]
pub(crate) struct AccessIter<'a, K, V> {
    list: &'a AccessList<K, V>,
    next: usize,
}

impl<'a, K, V> Iterator for AccessIter<'a, K, V> {
    type Item = (CellId, &'a Cell<K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let ix = self.next;
        let cell = self.list.cell(CellId(ix));
        self.next = cell.next;
        Some((CellId(ix), cell))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn keys_in_order(list: &AccessList<u32, String>) -> Vec<u32> {
        list.iter().map(|(_, cell)| cell.key).collect()
    }

    fn insert(list: &mut AccessList<u32, String>, key: u32) -> CellId {
        list.insert_head(key, Rc::new(format!("v{key}")))
    }

    #[rstest]
    fn test_empty_list() {
        let list: AccessList<u32, String> = AccessList::with_capacity(4);
        assert!(list.is_empty());
        assert_eq!(list.newest(), None);
        assert_eq!(list.oldest(), None);
        assert_eq!(list.oldest_strong(), None);
        assert_eq!(list.newest_weak(), None);
        assert_eq!(list.iter().count(), 0);
    }

    #[rstest]
    fn test_insert_orders_most_recent_first() {
        let mut list = AccessList::with_capacity(4);
        let a = insert(&mut list, 1);
        let c = insert(&mut list, 3);
        insert(&mut list, 2);

        assert_eq!(keys_in_order(&list), vec![2, 3, 1]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.strong_len(), 3);
        assert_eq!(list.weak_len(), 0);
        assert_eq!(list.oldest(), Some(a));
        assert_eq!(list.oldest_strong(), Some(a));

        list.touch(c);
        assert_eq!(keys_in_order(&list), vec![3, 2, 1]);
    }

    #[rstest]
    fn test_demote_and_promote_maintain_chains() {
        let mut list = AccessList::with_capacity(4);
        let a = insert(&mut list, 1);
        let b = insert(&mut list, 2);
        let c = insert(&mut list, 3);

        // Demote the oldest strong (1), then the next oldest (2)
        let retained_a = list.demote(a).unwrap();
        let _retained_b = list.demote(b).unwrap();
        assert_eq!(list.strong_len(), 1);
        assert_eq!(list.weak_len(), 2);
        assert_eq!(list.oldest_strong(), Some(c));
        assert_eq!(list.newest_weak(), Some(b));
        assert_eq!(list.oldest_weak(), Some(a));
        // Main chain order is unaffected by strength transitions
        assert_eq!(keys_in_order(&list), vec![3, 2, 1]);

        // Promote the newest weak back as the least recent strong
        assert!(list.promote_back(b));
        assert_eq!(list.strong_len(), 2);
        assert_eq!(list.oldest_strong(), Some(b));
        assert_eq!(list.newest_weak(), Some(a));

        drop(retained_a);
        assert!(!list.promote_front(a));
        assert_eq!(list.cell(a).strength(), Strength::Weak);
        assert!(list.cell(a).is_reclaimed());
    }

    #[rstest]
    fn test_remove_relinks_neighbors() {
        let mut list = AccessList::with_capacity(4);
        insert(&mut list, 1);
        let b = insert(&mut list, 2);
        insert(&mut list, 3);

        let cell = list.remove(b);
        assert_eq!(cell.key, 2);
        assert_eq!(keys_in_order(&list), vec![3, 1]);
        assert_eq!(list.len(), 2);
        assert!(!list.is_occupied(b));
    }

    #[rstest]
    fn test_slot_recycling_reuses_freed_slots() {
        let mut list = AccessList::with_capacity(2);
        let a = insert(&mut list, 1);
        insert(&mut list, 2);
        list.remove(a);

        let c = insert(&mut list, 3);
        assert_eq!(c, a, "freed slot should be recycled");
        assert_eq!(keys_in_order(&list), vec![3, 2]);
    }

    #[rstest]
    fn test_touch_weak_cell_keeps_weak_chain_consistent() {
        let mut list = AccessList::with_capacity(4);
        let a = insert(&mut list, 1);
        let b = insert(&mut list, 2);
        let _ra = list.demote(a).unwrap();
        let _rb = list.demote(b).unwrap();

        assert_eq!(list.newest_weak(), Some(b));
        list.touch(a);
        assert_eq!(list.newest_weak(), Some(a));
        assert_eq!(list.oldest_weak(), Some(b));
        assert_eq!(keys_in_order(&list), vec![1, 2]);
    }

    #[rstest]
    fn test_clear_resets_everything() {
        let mut list = AccessList::with_capacity(4);
        insert(&mut list, 1);
        insert(&mut list, 2);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.strong_len(), 0);
        assert_eq!(list.weak_len(), 0);
        assert_eq!(list.newest(), None);
    }
}
