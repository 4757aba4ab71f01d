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

//! Secondary indexes: derived-key lookup tables kept coherent with the primary store.
//!
//! An index is registered with an *attribute*, a pure function from value to an optional
//! derived key. Values for which the attribute returns `None` are simply not indexed.
//! Each index keeps a reverse cell-to-derived-key map so that a cell can be unindexed after
//! its value has been reclaimed, when the attribute can no longer be evaluated.
//!
//! Attribute purity is a caller obligation: mutating a value so that its attribute changes
//! while it is cached yields undefined index state.

use std::{any::Any, fmt, marker::PhantomData};

use ahash::AHashMap;
use indexmap::IndexSet;

use crate::cache::cell::CellId;

/// A typed handle to a registered secondary index.
///
/// Handles are only meaningful for the cache instance that produced them.
pub struct IndexHandle<D> {
    pub(crate) slot: usize,
    _phantom: PhantomData<fn() -> D>,
}

impl<D> IndexHandle<D> {
    pub(crate) const fn new(slot: usize) -> Self {
        Self {
            slot,
            _phantom: PhantomData,
        }
    }
}

impl<D> Clone for IndexHandle<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for IndexHandle<D> {}

impl<D> fmt::Debug for IndexHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(stringify!(IndexHandle)).field(&self.slot).finish()
    }
}

/// The outcome of installing a cell into an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexInsert {
    /// The cell was installed under its derived key.
    Installed,
    /// The attribute returned `None`; the cell is not indexed.
    Skipped,
    /// Unique variant only: the cell displaced the previous occupant of its derived key,
    /// which must now be invalidated by the caller.
    Displaced(CellId),
}

/// The store-facing face of a registered secondary index, erased over the derived-key type.
pub(crate) trait SecondaryIndex<V> {
    /// Installs `cell` under the derived key of `value`, if any.
    fn insert(&mut self, cell: CellId, value: &V) -> IndexInsert;

    /// Removes `cell` from its bucket, dropping an emptied bucket entirely.
    fn remove(&mut self, cell: CellId);

    fn clear(&mut self);

    /// Number of cells currently indexed.
    fn len(&self) -> usize;

    /// All indexed cells, for integrity checking.
    fn member_cells(&self) -> Vec<CellId>;

    /// Verifies internal forward/reverse coherence.
    fn verify(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// A one-to-one secondary index: at most one cell per derived key.
pub struct UniqueIndex<V, D> {
    attribute: Box<dyn Fn(&V) -> Option<D>>,
    cells: AHashMap<D, CellId>,
    derived: AHashMap<CellId, D>,
}

impl<V, D> UniqueIndex<V, D>
where
    D: Clone + Eq + std::hash::Hash + fmt::Debug + 'static,
    V: 'static,
{
    /// Creates a new empty [`UniqueIndex`] instance over the given attribute.
    pub(crate) fn new(attribute: Box<dyn Fn(&V) -> Option<D>>) -> Self {
        Self {
            attribute,
            cells: AHashMap::new(),
            derived: AHashMap::new(),
        }
    }

    /// Evaluates the attribute for `value`.
    pub(crate) fn derive(&self, value: &V) -> Option<D> {
        (self.attribute)(value)
    }

    /// Returns the cell installed under `derived`, if any.
    pub(crate) fn cell_for(&self, derived: &D) -> Option<CellId> {
        self.cells.get(derived).copied()
    }
}

impl<V, D> fmt::Debug for UniqueIndex<V, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(UniqueIndex))
            .field("len", &self.cells.len())
            .finish()
    }
}

impl<V, D> SecondaryIndex<V> for UniqueIndex<V, D>
where
    D: Clone + Eq + std::hash::Hash + fmt::Debug + 'static,
    V: 'static,
{
    fn insert(&mut self, cell: CellId, value: &V) -> IndexInsert {
        let Some(derived) = self.derive(value) else {
            return IndexInsert::Skipped;
        };
        match self.cells.insert(derived.clone(), cell) {
            Some(previous) if previous != cell => {
                self.derived.remove(&previous);
                self.derived.insert(cell, derived);
                IndexInsert::Displaced(previous)
            }
            _ => {
                self.derived.insert(cell, derived);
                IndexInsert::Installed
            }
        }
    }

    fn remove(&mut self, cell: CellId) {
        if let Some(derived) = self.derived.remove(&cell) {
            // Only clear the bucket if this cell is still its occupant; a displacing
            // insert may have already claimed the derived key
            if self.cells.get(&derived) == Some(&cell) {
                self.cells.remove(&derived);
            }
        }
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.derived.clear();
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn member_cells(&self) -> Vec<CellId> {
        self.derived.keys().copied().collect()
    }

    fn verify(&self) -> bool {
        self.cells.len() == self.derived.len()
            && self
                .derived
                .iter()
                .all(|(cell, derived)| self.cells.get(derived) == Some(cell))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A one-to-many secondary index: an ordered set of cells per derived key.
pub struct MultiIndex<V, D> {
    attribute: Box<dyn Fn(&V) -> Option<D>>,
    cells: AHashMap<D, IndexSet<CellId>>,
    derived: AHashMap<CellId, D>,
}

impl<V, D> MultiIndex<V, D>
where
    D: Clone + Eq + std::hash::Hash + fmt::Debug + 'static,
    V: 'static,
{
    /// Creates a new empty [`MultiIndex`] instance over the given attribute.
    pub(crate) fn new(attribute: Box<dyn Fn(&V) -> Option<D>>) -> Self {
        Self {
            attribute,
            cells: AHashMap::new(),
            derived: AHashMap::new(),
        }
    }

    pub(crate) fn derive(&self, value: &V) -> Option<D> {
        (self.attribute)(value)
    }

    /// Returns the cells installed under `derived` in insertion order.
    pub(crate) fn cells_for(&self, derived: &D) -> Vec<CellId> {
        self.cells
            .get(derived)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl<V, D> fmt::Debug for MultiIndex<V, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(MultiIndex))
            .field("len", &self.derived.len())
            .field("buckets", &self.cells.len())
            .finish()
    }
}

impl<V, D> SecondaryIndex<V> for MultiIndex<V, D>
where
    D: Clone + Eq + std::hash::Hash + fmt::Debug + 'static,
    V: 'static,
{
    fn insert(&mut self, cell: CellId, value: &V) -> IndexInsert {
        let Some(derived) = self.derive(value) else {
            return IndexInsert::Skipped;
        };
        self.cells.entry(derived.clone()).or_default().insert(cell);
        self.derived.insert(cell, derived);
        IndexInsert::Installed
    }

    fn remove(&mut self, cell: CellId) {
        if let Some(derived) = self.derived.remove(&cell)
            && let Some(bucket) = self.cells.get_mut(&derived)
        {
            bucket.shift_remove(&cell);
            if bucket.is_empty() {
                self.cells.remove(&derived);
            }
        }
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.derived.clear();
    }

    fn len(&self) -> usize {
        self.derived.len()
    }

    fn member_cells(&self) -> Vec<CellId> {
        self.derived.keys().copied().collect()
    }

    fn verify(&self) -> bool {
        let bucket_total: usize = self.cells.values().map(IndexSet::len).sum();
        bucket_total == self.derived.len()
            && self.cells.values().all(|bucket| !bucket.is_empty())
            && self.derived.iter().all(|(cell, derived)| {
                self.cells
                    .get(derived)
                    .is_some_and(|bucket| bucket.contains(cell))
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn first_letter(value: &String) -> Option<char> {
        value.chars().next()
    }

    #[rstest]
    fn test_unique_index_install_and_remove() {
        let mut index: UniqueIndex<String, char> = UniqueIndex::new(Box::new(first_letter));
        assert_eq!(
            index.insert(CellId(0), &"apple".to_string()),
            IndexInsert::Installed
        );
        assert_eq!(index.cell_for(&'a'), Some(CellId(0)));
        assert_eq!(index.len(), 1);
        assert!(index.verify());

        index.remove(CellId(0));
        assert_eq!(index.cell_for(&'a'), None);
        assert_eq!(index.len(), 0);
        assert!(index.verify());
    }

    #[rstest]
    fn test_unique_index_displacement() {
        let mut index: UniqueIndex<String, char> = UniqueIndex::new(Box::new(first_letter));
        index.insert(CellId(0), &"apple".to_string());
        assert_eq!(
            index.insert(CellId(1), &"apricot".to_string()),
            IndexInsert::Displaced(CellId(0))
        );
        assert_eq!(index.cell_for(&'a'), Some(CellId(1)));
        assert!(index.verify());

        // Removing the displaced cell must not disturb the new occupant
        index.remove(CellId(0));
        assert_eq!(index.cell_for(&'a'), Some(CellId(1)));
        assert!(index.verify());
    }

    #[rstest]
    fn test_unique_index_skips_absent_attribute() {
        let mut index: UniqueIndex<String, char> = UniqueIndex::new(Box::new(first_letter));
        assert_eq!(
            index.insert(CellId(0), &String::new()),
            IndexInsert::Skipped
        );
        assert_eq!(index.len(), 0);
        // Removing an unindexed cell is a no-op
        index.remove(CellId(0));
        assert!(index.verify());
    }

    #[rstest]
    fn test_multi_index_buckets_preserve_order() {
        let mut index: MultiIndex<String, char> = MultiIndex::new(Box::new(first_letter));
        index.insert(CellId(0), &"apple".to_string());
        index.insert(CellId(1), &"apricot".to_string());
        index.insert(CellId(2), &"banana".to_string());

        assert_eq!(index.cells_for(&'a'), vec![CellId(0), CellId(1)]);
        assert_eq!(index.cells_for(&'b'), vec![CellId(2)]);
        assert_eq!(index.len(), 3);
        assert!(index.verify());
    }

    #[rstest]
    fn test_multi_index_drops_empty_bucket() {
        let mut index: MultiIndex<String, char> = MultiIndex::new(Box::new(first_letter));
        index.insert(CellId(0), &"apple".to_string());
        index.insert(CellId(1), &"apricot".to_string());

        index.remove(CellId(0));
        assert_eq!(index.cells_for(&'a'), vec![CellId(1)]);

        index.remove(CellId(1));
        assert!(index.cells_for(&'a').is_empty());
        assert_eq!(index.len(), 0);
        assert!(index.verify());
    }
}
